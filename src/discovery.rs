//! Locates an OpenCart installation and reads its database credentials.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use regex::Regex;

use bgn2eur_core::{is_valid_prefix, DbCredentials, TableNames};

use crate::{
    error::ConvertError,
    storage::{open_connector, Connector, StoreDriver},
};

const CONFIG_FILE: &str = "config.php";
const ADMIN_CONFIG_FILE: &str = "admin/config.php";

/// `define('NAME', 'value')`, `define("NAME", "value")` or `define('NAME', 3306)`.
const DEFINE_PATTERN: &str =
    r#"define\s*\(\s*['"](\w+)['"]\s*,\s*(?:'([^']*)'|"([^"]*)"|([^\s'"\)]+))\s*\)"#;

fn read_defines(content: &str) -> Result<HashMap<String, String>, ConvertError> {
    let pattern = Regex::new(DEFINE_PATTERN)
        .map_err(|e| ConvertError::InvalidConfiguration(format!("define pattern: {}", e)))?;
    let mut defines = HashMap::new();
    for caps in pattern.captures_iter(content) {
        let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4));
        if let (Some(name), Some(value)) = (caps.get(1), value) {
            // First definition wins, as in PHP.
            defines
                .entry(name.as_str().to_string())
                .or_insert_with(|| value.as_str().to_string());
        }
    }
    Ok(defines)
}

/// Extracts the `DB_*` constants from the contents of `config.php`.
pub fn parse_credentials(content: &str) -> Result<DbCredentials, ConvertError> {
    let defines = read_defines(content)?;
    let take = |name: &str| {
        defines.get(name).cloned().ok_or_else(|| {
            ConvertError::ConfigurationMissing(format!("unable to extract {} from {}", name, CONFIG_FILE))
        })
    };

    let port = take("DB_PORT")?;
    let port = port
        .parse::<u16>()
        .map_err(|_| ConvertError::InvalidConfiguration(format!("DB_PORT is not a valid port: {}", port)))?;
    let prefix = take("DB_PREFIX")?;
    if !is_valid_prefix(&prefix) {
        return Err(ConvertError::InvalidConfiguration(format!(
            "DB_PREFIX may only contain letters, digits and underscores: {}",
            prefix
        )));
    }

    Ok(DbCredentials {
        // OpenCart's installer writes mysqli unless told otherwise.
        driver: defines.get("DB_DRIVER").cloned().unwrap_or_else(|| "mysqli".to_string()),
        hostname: take("DB_HOSTNAME")?,
        username: take("DB_USERNAME")?,
        password: take("DB_PASSWORD")?,
        database: take("DB_DATABASE")?,
        port,
        prefix,
    })
}

/// Reads credentials from `{root}/config.php`, requiring `{root}/admin/config.php` to exist too.
pub fn discover_installation(root: &Path) -> Result<DbCredentials, ConvertError> {
    let config = root.join(CONFIG_FILE);
    let admin_config = root.join(ADMIN_CONFIG_FILE);
    if !config.is_file() {
        return Err(ConvertError::ConfigurationMissing(format!(
            "{} not found at: {}",
            CONFIG_FILE,
            config.display()
        )));
    }
    if !admin_config.is_file() {
        return Err(ConvertError::ConfigurationMissing(format!(
            "{} not found at: {}",
            ADMIN_CONFIG_FILE,
            admin_config.display()
        )));
    }

    let content = std::fs::read_to_string(&config).map_err(|e| {
        ConvertError::ConfigurationMissing(format!("unable to read {}: {}", config.display(), e))
    })?;
    let credentials = parse_credentials(&content)?;
    tracing::debug!(credentials = ?credentials, "Installation discovered");
    Ok(credentials)
}

/// A discovered installation with a connector for its database.
#[derive(Clone)]
pub struct Installation {
    pub credentials: DbCredentials,
    pub names: TableNames,
    pub connector: Arc<dyn Connector>,
}

impl Installation {
    pub fn new(credentials: DbCredentials, connector: Arc<dyn Connector>) -> Self {
        Self {
            names: TableNames::new(credentials.prefix.clone()),
            credentials,
            connector,
        }
    }
}

impl fmt::Debug for Installation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installation")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Installation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Driver:   {}", self.credentials.driver)?;
        writeln!(f, "Database: {}", self.credentials.database)?;
        writeln!(f, "Host:     {}:{}", self.credentials.hostname, self.credentials.port)?;
        writeln!(f, "User:     {}", self.credentials.username)?;
        write!(f, "Prefix:   {}", self.credentials.prefix)
    }
}

/// Resolves an installation. The orchestrator goes through this so tests can skip the filesystem.
pub trait InstallationProbe {
    fn discover(&self) -> Result<Installation, ConvertError>;
}

/// Probes an OpenCart root on disk.
#[derive(Debug, Clone)]
pub struct OpenCartProbe {
    root: PathBuf,
    /// Overrides the engine named by `DB_DRIVER`.
    driver: Option<StoreDriver>,
}

impl OpenCartProbe {
    pub fn new(root: impl Into<PathBuf>, driver: Option<StoreDriver>) -> Self {
        Self {
            root: root.into(),
            driver,
        }
    }
}

impl InstallationProbe for OpenCartProbe {
    fn discover(&self) -> Result<Installation, ConvertError> {
        let credentials = discover_installation(&self.root)?;
        let driver = StoreDriver::resolve(self.driver, &credentials)?;
        tracing::debug!(%driver, db_driver = %credentials.driver, "Storage driver selected");
        let connector = open_connector(driver, &credentials, &self.root);
        Ok(Installation::new(credentials, connector))
    }
}
