use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::{maintenance::MaintenanceAction, recalculate::ConversionMode, storage::StoreDriver};

/// Official BGN per EUR rate.
pub const DEFAULT_RATE: Decimal = dec!(1.95583);

#[derive(Parser, Debug)]
#[command(
    name = "bgn2eur",
    about = "Converts OpenCart catalog prices from BGN to EUR",
    after_help = "Reports and error messages are in English. The storage driver follows DB_DRIVER in config.php unless --driver is given."
)]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "bgn2eur.toml")]
    pub config: String,

    /// OpenCart root directory (overrides config file)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Database driver (overrides config file and DB_DRIVER)
    #[arg(short, long, value_enum)]
    pub driver: Option<StoreDriver>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Locate the installation and show its database settings
    Discover,
    /// Check the BGN and EUR currency configuration
    Currency,
    /// Show catalog statistics and conversion status
    Stat,
    /// List products with their prices
    List,
    /// Copy every price table to a backup table
    Backup,
    /// Run the conversion in inspect, simulate or commit mode
    Recalculate {
        #[arg(value_enum, default_value_t = ConversionMode::Inspect)]
        mode: ConversionMode,
    },
    /// Put the backup tables back in place of the live tables
    Restore,
    /// Drop the backup tables
    Cleanup,
    /// Clear the conversion flag so that a conversion can run again
    Reset,
    /// Switch the storefront maintenance mode
    Maintenance {
        #[arg(value_enum)]
        action: MaintenanceAction,
    },
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub installation: InstallationConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InstallationConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Unset means the engine named by `DB_DRIVER` in `config.php`.
    #[serde(default)]
    pub driver: Option<StoreDriver>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversionConfig {
    /// BGN per EUR.
    #[serde(default = "default_rate")]
    pub rate: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_rate() -> Decimal {
    DEFAULT_RATE
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self { root: default_root() }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self { rate: default_rate() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        default_logging()
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(ref root) = cli.root {
            config.installation.root = root.clone();
        }
        if let Some(driver) = cli.driver {
            config.database.driver = Some(driver);
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }

        config
    }

    fn parse(contents: &str) -> Self {
        toml::from_str(contents).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to parse config file: {}", e);
            Config::default()
        })
    }
}
