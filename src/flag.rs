//! Conversion flag guard.
//!
//! The flag records that a commit-mode recalculation finished. It is
//! informational: nothing here blocks a second run. Clearing it is only
//! reachable through [`reset_conversion_flag`], which prints a warning first.

use std::{
    fmt::{self, Display},
    io::Write,
};

use bgn2eur_core::CONVERSION_FLAG_KEY;

use crate::{
    error::ConvertError,
    storage::{Connector, SettingsStore, StorageError},
};

const COMMITTED: &str = "1";
const NOT_CONVERTED: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    /// Key not present: no conversion was ever committed.
    Absent,
    /// "0", written by restore. Any value other than "1" reads as this.
    NotConverted,
    Converted,
}

impl FlagState {
    fn from_value(value: Option<&str>) -> Self {
        match value {
            None => FlagState::Absent,
            Some(COMMITTED) => FlagState::Converted,
            Some(_) => FlagState::NotConverted,
        }
    }

    pub fn is_converted(&self) -> bool {
        *self == FlagState::Converted
    }
}

impl Display for FlagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagState::Absent => f.write_str("not run"),
            FlagState::NotConverted => write!(f, "restored or reset ({} = 0)", CONVERSION_FLAG_KEY),
            FlagState::Converted => write!(f, "already converted ({} = 1)", CONVERSION_FLAG_KEY),
        }
    }
}

/// Reads and writes the flag through a settings store borrowed from one connection.
pub struct ConversionFlag<'a> {
    store: &'a mut dyn SettingsStore,
}

impl<'a> ConversionFlag<'a> {
    pub fn new(store: &'a mut dyn SettingsStore) -> Self {
        Self { store }
    }

    pub fn read(&mut self) -> Result<FlagState, StorageError> {
        let value = self.store.get(CONVERSION_FLAG_KEY)?;
        Ok(FlagState::from_value(value.as_deref()))
    }

    pub fn set_committed(&mut self) -> Result<(), StorageError> {
        tracing::debug!(key = CONVERSION_FLAG_KEY, "Marking conversion as committed");
        self.store.put(CONVERSION_FLAG_KEY, COMMITTED)
    }

    /// Records that the catalog is back in pre-conversion state.
    pub fn mark_restored(&mut self) -> Result<(), StorageError> {
        tracing::debug!(key = CONVERSION_FLAG_KEY, "Marking conversion as reverted");
        self.store.put(CONVERSION_FLAG_KEY, NOT_CONVERTED)
    }

    fn clear(&mut self) -> Result<bool, StorageError> {
        self.store.delete(CONVERSION_FLAG_KEY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    NeverRun,
    Cleared { previous: FlagState },
}

const BANNER: &str = "\
==================================================================
 WARNING: resetting the conversion flag
==================================================================
 The flag is the only record that prices were already converted.
 Clearing it allows `recalculate commit` to run again, and a second
 commit divides every price by the rate a second time.
 Only continue if prices were restored from backup or you are
 certain no conversion was committed.
==================================================================";

/// Prints the warning banner, then removes the flag.
pub fn reset_conversion_flag(
    connector: &dyn Connector,
    out: &mut dyn Write,
) -> Result<ResetOutcome, ConvertError> {
    writeln!(out, "{}", BANNER)?;

    let mut conn = connector.connect().map_err(ConvertError::Connection)?;
    let mut flag = ConversionFlag::new(conn.settings());
    let previous = flag.read().map_err(ConvertError::Flag)?;

    if previous == FlagState::Absent {
        writeln!(out, "Flag {} not found: conversion was never run.", CONVERSION_FLAG_KEY)?;
        return Ok(ResetOutcome::NeverRun);
    }

    flag.clear().map_err(ConvertError::Flag)?;
    tracing::info!(previous = %previous, "Conversion flag cleared");
    writeln!(out, "Flag {} removed (was: {}).", CONVERSION_FLAG_KEY, previous)?;
    writeln!(out, "Check current prices with `list` before running `recalculate commit` again.")?;
    Ok(ResetOutcome::Cleared { previous })
}
