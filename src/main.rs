use std::{
    io::{self, Write},
    process::ExitCode,
};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bgn2eur::{
    backup::create_backups,
    cleanup::drop_backups,
    config::{CliArgs, Command, Config, LoggingConfig},
    currency::validate_currency,
    discovery::{InstallationProbe, OpenCartProbe},
    flag::reset_conversion_flag,
    listing::list_products,
    maintenance::{set_maintenance, MaintenanceAction},
    orchestrator::Lifecycle,
    restore::restore_from_backups,
    stats::collect_statistics,
    ConvertError, MONETARY_TABLES,
};

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: &Command, config: &Config) -> Result<(), ConvertError> {
    let probe = OpenCartProbe::new(config.installation.root.clone(), config.database.driver);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Command::Recalculate { mode } = command {
        Lifecycle::new(&probe, config.conversion.rate, &MONETARY_TABLES).run(*mode, &mut out)?;
        return Ok(());
    }

    let installation = probe.discover()?;
    let connector = installation.connector.as_ref();
    let names = &installation.names;

    match command {
        Command::Discover => writeln!(out, "{}", installation)?,
        Command::Currency => writeln!(out, "{}", validate_currency(connector, config.conversion.rate)?)?,
        Command::Stat => write!(out, "{}", collect_statistics(connector, names)?)?,
        Command::List => write!(out, "{}", list_products(connector)?)?,
        Command::Backup => write!(out, "{}", create_backups(connector, names, &MONETARY_TABLES)?)?,
        Command::Restore => write!(out, "{}", restore_from_backups(connector, names, &MONETARY_TABLES)?)?,
        Command::Cleanup => write!(out, "{}", drop_backups(connector, names, &MONETARY_TABLES)?)?,
        Command::Reset => {
            reset_conversion_flag(connector, &mut out)?;
        }
        Command::Maintenance { action } => {
            set_maintenance(connector, *action)?;
            let state = match action {
                MaintenanceAction::Enable => "enabled",
                MaintenanceAction::Disable => "disabled",
            };
            writeln!(out, "Maintenance mode {}.", state)?;
        }
        Command::Recalculate { .. } => {}
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    init_logging(&config.logging);

    match run(&cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
