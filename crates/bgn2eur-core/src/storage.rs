use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    catalog::MonetaryTable,
    models::{CurrencyRecord, PriceRow, ProductListing},
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("table already exists: {0}")]
    TableAlreadyExists(String),
    #[error("invalid value in {column}: {value}")]
    InvalidValue { column: String, value: String },
    #[error("{0}")]
    Other(String),
}

/// Opaque schema-validation setting captured before relaxing it, so it can be put back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMode(pub String);

/// Small key/value view over the store's settings table.
pub trait SettingsStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StorageError>;

    /// Inserts the key or overwrites its value.
    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Overwrites an existing key only. Returns `false` when the key is absent.
    fn update(&mut self, key: &str, value: &str) -> Result<bool, StorageError>;

    /// Returns `false` when there was nothing to delete.
    fn delete(&mut self, key: &str) -> Result<bool, StorageError>;
}

/// One open connection to a store's catalog.
///
/// Structural operations (`clone_structure`, `rename_table`, `drop_table`) are
/// individually atomic on the supported engines. Only `rename_tables` may group
/// several of them, and only where `renames_atomically` says so; otherwise
/// callers sequence them explicitly.
pub trait CatalogBackend: Send {
    fn table_exists(&mut self, table: &str) -> Result<bool, StorageError>;

    /// Creates `target` with the same columns and indexes as `source`, without rows.
    fn clone_structure(&mut self, source: &str, target: &str) -> Result<(), StorageError>;

    /// Copies every row of `source` into `target`, returning the number of rows copied.
    fn copy_rows(&mut self, source: &str, target: &str) -> Result<u64, StorageError>;

    fn count_rows(&mut self, table: &str) -> Result<u64, StorageError>;
    fn count_by_status(&mut self, table: &str, active: bool) -> Result<u64, StorageError>;

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), StorageError>;

    /// True when [`rename_tables`](Self::rename_tables) applies every rename in one atomic statement.
    fn renames_atomically(&self) -> bool {
        false
    }

    /// Applies `renames` in order. The default issues one `rename_table` per pair and
    /// stops at the first failure, leaving earlier renames in place.
    fn rename_tables(&mut self, renames: &[(&str, &str)]) -> Result<(), StorageError> {
        for (from, to) in renames {
            self.rename_table(from, to)?;
        }
        Ok(())
    }

    /// Hands objects owned by `previous` that `current` still depends on over to
    /// `current`, so that `previous` can be dropped. On PostgreSQL these are the
    /// sequences behind serial and identity columns.
    fn adopt_dependents(&mut self, _previous: &str, _current: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<(), StorageError>;

    /// Rows of `qualified_name` whose price passes `table.filter`, ordered by id.
    fn select_prices(&mut self, qualified_name: &str, table: &MonetaryTable) -> Result<Vec<PriceRow>, StorageError>;
    fn update_price(&mut self, qualified_name: &str, table: &MonetaryTable, id: i64, price: Decimal) -> Result<(), StorageError>;

    /// Switches the session to lenient schema validation and returns the previous mode.
    fn relax_schema_mode(&mut self) -> Result<SchemaMode, StorageError>;
    fn restore_schema_mode(&mut self, previous: &SchemaMode) -> Result<(), StorageError>;

    fn currency(&mut self, code: &str) -> Result<Option<CurrencyRecord>, StorageError>;
    fn active_language(&mut self) -> Result<Option<i64>, StorageError>;
    fn product_listing(&mut self, language_id: i64) -> Result<Vec<ProductListing>, StorageError>;

    fn settings(&mut self) -> &mut dyn SettingsStore;
}

/// Opens a fresh connection per call. Dropping the returned backend releases it.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn CatalogBackend>, StorageError>;
}
