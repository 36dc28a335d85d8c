//! BGN to EUR price conversion for OpenCart catalogs.
//!
//! The lifecycle is backup, recalculate (inspect, simulate, commit), then
//! either cleanup or restore. Each component opens its own connection through
//! a [`storage::Connector`].

pub mod backup;
pub mod cleanup;
pub mod config;
pub mod currency;
pub mod discovery;
pub mod error;
pub mod flag;
pub mod listing;
pub mod maintenance;
pub mod orchestrator;
pub mod recalculate;
pub mod restore;
pub mod stats;
pub mod storage;

pub use bgn2eur_core::{MonetaryTable, TableNames, MONETARY_TABLES};
pub use error::{ConvertError, Stage};
pub use recalculate::{convert_price, ConversionMode};
