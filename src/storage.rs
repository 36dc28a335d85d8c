use std::{
    fmt::{self, Display},
    path::Path,
    sync::Arc,
};

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::ConvertError;

use bgn2eur_mysql::MysqlConnector;
use bgn2eur_postgres::PostgresConnector;
use bgn2eur_sqlite::SqliteConnector;

// Re-export core storage types so components only depend on crate::storage
pub use bgn2eur_core::storage::{CatalogBackend, Connector, SchemaMode, SettingsStore, StorageError};

/// Database engine an installation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    /// MySQL or MariaDB, what a stock OpenCart runs on.
    #[default]
    Mysql,
    Postgres,
    Sqlite,
}

impl StoreDriver {
    /// Maps OpenCart's `DB_DRIVER` to an engine. Matching ignores case.
    pub fn from_db_driver(driver: &str) -> Option<Self> {
        match driver.trim().to_ascii_lowercase().as_str() {
            "mysqli" | "mysql" | "mpdo" => Some(StoreDriver::Mysql),
            "pgsql" | "postgre" | "postgres" | "postgresql" => Some(StoreDriver::Postgres),
            "sqlite" | "sqlite3" => Some(StoreDriver::Sqlite),
            _ => None,
        }
    }

    /// An explicit choice wins; otherwise the engine follows `DB_DRIVER`.
    pub fn resolve(explicit: Option<Self>, credentials: &bgn2eur_core::DbCredentials) -> Result<Self, ConvertError> {
        if let Some(driver) = explicit {
            return Ok(driver);
        }
        Self::from_db_driver(&credentials.driver).ok_or_else(|| {
            ConvertError::InvalidConfiguration(format!(
                "unsupported DB_DRIVER '{}', pass --driver mysql, postgres or sqlite",
                credentials.driver
            ))
        })
    }
}

impl Display for StoreDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreDriver::Mysql => f.write_str("mysql"),
            StoreDriver::Postgres => f.write_str("postgres"),
            StoreDriver::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Builds the connector for `driver`. Nothing is opened until a component calls `connect`.
///
/// For SQLite a relative `DB_DATABASE` is resolved against the installation root.
pub fn open_connector(
    driver: StoreDriver,
    credentials: &bgn2eur_core::DbCredentials,
    root: &Path,
) -> Arc<dyn Connector> {
    match driver {
        StoreDriver::Mysql => Arc::new(MysqlConnector::new(credentials)),
        StoreDriver::Postgres => Arc::new(PostgresConnector::new(credentials)),
        StoreDriver::Sqlite => {
            let path = Path::new(&credentials.database);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            };
            Arc::new(SqliteConnector::new(
                path.to_string_lossy().into_owned(),
                &credentials.prefix,
            ))
        }
    }
}
