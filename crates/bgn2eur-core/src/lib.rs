//! Core types and traits for bgn2eur storage backends.
//!
//! This crate provides the monetary table catalog, the `CatalogBackend` and
//! `SettingsStore` traits and the `Connector` seam, enabling pluggable storage
//! implementations in separate crates.

pub mod catalog;
pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use catalog::{
    MonetaryTable, PriceFilter, TableNames, BACKUP_PREFIX, BASE_CURRENCY, CONVERSION_FLAG_KEY,
    HOLDING_PREFIX, MAINTENANCE_KEY, is_valid_prefix, MONETARY_TABLES, RESTORE_PROGRESS_KEY, SETTING_GROUP,
    TARGET_CURRENCY,
};
pub use models::{CurrencyRecord, DbCredentials, ListingTable, PriceRow, ProductListing};
pub use storage::{CatalogBackend, Connector, SchemaMode, SettingsStore, StorageError};
