//! Recalculation engine.
//!
//! One pass per monetary table. Row selection and arithmetic are shared by
//! every mode; only commit writes. Commit updates rows one at a time, so a
//! failed write leaves the earlier rows of that table converted.

use std::fmt::{self, Display};

use clap::ValueEnum;
use rust_decimal::{Decimal, RoundingStrategy};

use bgn2eur_core::{MonetaryTable, TableNames};

use crate::{
    error::ConvertError,
    flag::ConversionFlag,
    storage::CatalogBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConversionMode {
    /// Validate readiness only; no rows are read.
    #[default]
    Inspect,
    /// Read rows and report the converted prices without writing.
    Simulate,
    /// Write converted prices and set the conversion flag.
    #[value(alias = "proceed")]
    Commit,
}

impl Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionMode::Inspect => f.write_str("inspect"),
            ConversionMode::Simulate => f.write_str("simulate"),
            ConversionMode::Commit => f.write_str("commit"),
        }
    }
}

/// `price / rate` rounded to cents, halves away from zero.
pub fn convert_price(price: Decimal, rate: Decimal) -> Decimal {
    (price / rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceChange {
    pub id: i64,
    pub old: Decimal,
    pub new: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConversion {
    pub table: MonetaryTable,
    pub qualified_name: String,
    pub converted: u64,
    pub changes: Vec<PriceChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRun {
    pub mode: ConversionMode,
    pub tables: Vec<TableConversion>,
    pub flag_warning: Option<String>,
}

impl ConversionRun {
    pub(crate) fn new(mode: ConversionMode) -> Self {
        Self {
            mode,
            tables: Vec::new(),
            flag_warning: None,
        }
    }

    pub fn converted(&self) -> u64 {
        self.tables.iter().map(|t| t.converted).sum()
    }

    pub fn converted_in(&self, qualified_name: &str) -> Option<u64> {
        self.tables
            .iter()
            .find(|t| t.qualified_name == qualified_name)
            .map(|t| t.converted)
    }

    fn completed(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.qualified_name.clone()).collect()
    }
}

impl Display for ConversionRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pass in &self.tables {
            if self.mode == ConversionMode::Simulate {
                writeln!(f, "{} ({}):", pass.table.label, pass.qualified_name)?;
                for change in &pass.changes {
                    writeln!(f, "  #{}: {} BGN -> {} EUR", change.id, change.old, change.new)?;
                }
            }
            let verb = match self.mode {
                ConversionMode::Commit => "converted",
                _ => "would be converted",
            };
            writeln!(f, "{}: {} {}", pass.table.label, pass.converted, verb)?;
        }
        if let Some(warning) = &self.flag_warning {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}

/// Runs one pass over `tables` on an open connection.
///
/// Inspect returns an empty run. Commit sets the conversion flag after the
/// last table; a flag failure is carried as a warning.
pub fn recalculate(
    conn: &mut dyn CatalogBackend,
    names: &TableNames,
    tables: &[MonetaryTable],
    rate: Decimal,
    mode: ConversionMode,
) -> Result<ConversionRun, ConvertError> {
    if rate <= Decimal::ZERO {
        return Err(ConvertError::InvalidRate(rate));
    }

    let mut run = ConversionRun::new(mode);
    if mode == ConversionMode::Inspect {
        return Ok(run);
    }

    for table in tables {
        let qualified_name = names.live(table.name);
        let rows = conn.select_prices(&qualified_name, table)?;
        let mut pass = TableConversion {
            table: *table,
            qualified_name,
            converted: 0,
            changes: Vec::with_capacity(rows.len()),
        };

        for row in rows {
            let new = convert_price(row.price, rate);
            if mode == ConversionMode::Commit {
                conn.update_price(&pass.qualified_name, table, row.id, new)
                    .map_err(|source| ConvertError::RowWrite {
                        table: pass.qualified_name.clone(),
                        id: row.id,
                        written: pass.converted,
                        completed: run.completed(),
                        source,
                    })?;
                tracing::debug!(table = %pass.qualified_name, id = row.id, old = %row.price, new = %new, "Price updated");
            }
            pass.changes.push(PriceChange {
                id: row.id,
                old: row.price,
                new,
            });
            pass.converted += 1;
        }

        tracing::info!(table = %pass.qualified_name, converted = pass.converted, mode = %mode, "Table processed");
        run.tables.push(pass);
    }

    if mode == ConversionMode::Commit {
        if let Err(e) = ConversionFlag::new(conn.settings()).set_committed() {
            tracing::warn!(error = %e, "Could not set conversion flag");
            run.flag_warning = Some(format!("conversion flag could not be set: {}", e));
        }
    }

    Ok(run)
}
