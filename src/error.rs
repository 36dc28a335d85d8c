use std::fmt::{self, Display};

use rust_decimal::Decimal;
use thiserror::Error;

use crate::storage::StorageError;

/// Orchestrator stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Currency,
    Statistics,
    Recalculation,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Discovery => "Discovery",
            Stage::Currency => "Currency",
            Stage::Statistics => "Statistics",
            Stage::Recalculation => "Recalculation",
        };
        f.write_str(label)
    }
}

/// Structural statement that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralStep {
    CloneStructure,
    CopyRows,
    AdoptDependents,
    DropHolding,
    DropBackup,
}

impl Display for StructuralStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StructuralStep::CloneStructure => "creating table structure",
            StructuralStep::CopyRows => "copying rows",
            StructuralStep::AdoptDependents => "moving sequences to the restored table",
            StructuralStep::DropHolding => "dropping replaced table",
            StructuralStep::DropBackup => "dropping backup",
        };
        f.write_str(label)
    }
}

fn completed_note(tables: &[String]) -> String {
    if tables.is_empty() {
        String::new()
    } else {
        format!(" (already completed: {})", tables.join(", "))
    }
}

fn restore_progress(restored: &[String], rolled_back: &bool) -> String {
    let rollback = if *rolled_back {
        "the live table is still in place under its original name"
    } else {
        "the live table could NOT be renamed back from its holding name, fix it manually"
    };
    if restored.is_empty() {
        format!("{}; no table was restored", rollback)
    } else {
        format!(
            "{}; tables already restored stay restored: {}",
            rollback,
            restored.join(", ")
        )
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("database connection failed: {0}")]
    Connection(#[source] StorageError),

    #[error("{0}")]
    ConfigurationMissing(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{0}")]
    CurrencyMismatch(String),

    #[error("exchange rate must be positive, got {0}")]
    InvalidRate(Decimal),

    #[error("backup {table} already exists and could not be removed: {source}{}", completed_note(.completed))]
    StaleBackup {
        table: String,
        completed: Vec<String>,
        #[source]
        source: StorageError,
    },

    #[error("backup table {0} does not exist, restore was not attempted")]
    BackupMissing(String),

    #[error("holding table {0} already exists next to its backup, drop it before restoring")]
    HoldingTableExists(String),

    #[error("live table {table} is missing while {holding} exists, rename {holding} back to {table} before restoring")]
    LiveTableMissing { table: String, holding: String },

    #[error("{step} failed for {table}: {source}{}", completed_note(.completed))]
    Structural {
        table: String,
        step: StructuralStep,
        completed: Vec<String>,
        #[source]
        source: StorageError,
    },

    #[error("restoring {table} failed: {source}; {}", restore_progress(.restored, .rolled_back))]
    RestoreFailed {
        table: String,
        restored: Vec<String>,
        rolled_back: bool,
        #[source]
        source: StorageError,
    },

    #[error("price update of {table} row {id} failed after {written} rows of that table were converted and were NOT rolled back: {source}{}", completed_note(.completed))]
    RowWrite {
        table: String,
        id: i64,
        written: u64,
        completed: Vec<String>,
        #[source]
        source: StorageError,
    },

    #[error("conversion flag operation failed: {0}")]
    Flag(#[source] StorageError),

    #[error("query failed: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("{stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ConvertError>,
    },
}

impl ConvertError {
    /// Labels the error with the orchestrator stage it occurred in.
    pub fn at(self, stage: Stage) -> Self {
        ConvertError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            ConvertError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
