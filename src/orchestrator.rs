//! Lifecycle orchestrator.
//!
//! `START -> DISCOVERED -> CURRENCY_VALIDATED -> STATS_REPORTED -> BACKUP_CHECKED`
//! and then one of `INSPECTED`, `SIMULATED` or `COMMITTED`. The first failing
//! stage ends the run with its label attached. A missing backup is only a
//! warning.

use std::io::Write;

use rust_decimal::Decimal;

use bgn2eur_core::MonetaryTable;

use crate::{
    backup::missing_backups,
    currency::{validate_currency, CurrencyCheck},
    discovery::{Installation, InstallationProbe},
    error::{ConvertError, Stage},
    recalculate::{recalculate, ConversionMode, ConversionRun},
    stats::{collect_statistics, CatalogStatistics},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Start,
    Discovered,
    CurrencyValidated,
    StatsReported,
    BackupChecked,
    Inspected,
    Simulated,
    Committed,
}

#[derive(Debug, Clone)]
pub struct LifecycleReport {
    pub state: LifecycleState,
    pub installation: Installation,
    pub currency: CurrencyCheck,
    pub statistics: CatalogStatistics,
    /// Backups that did not exist when checked, or `None` if the check itself failed.
    pub missing_backups: Option<Vec<String>>,
    pub run: ConversionRun,
}

pub struct Lifecycle<'a> {
    probe: &'a dyn InstallationProbe,
    rate: Decimal,
    tables: &'a [MonetaryTable],
}

impl<'a> Lifecycle<'a> {
    pub fn new(probe: &'a dyn InstallationProbe, rate: Decimal, tables: &'a [MonetaryTable]) -> Self {
        Self { probe, rate, tables }
    }

    /// Runs every stage up to `mode`, writing the operator report to `out`.
    pub fn run(&self, mode: ConversionMode, out: &mut dyn Write) -> Result<LifecycleReport, ConvertError> {
        let installation = self.probe.discover().map_err(|e| e.at(Stage::Discovery))?;
        tracing::info!(database = %installation.credentials.database, prefix = %installation.names.prefix(), "Discovered");
        writeln!(out, "{}", installation)?;
        writeln!(out, "Exchange rate: 1 EUR = {} BGN", self.rate)?;
        writeln!(out)?;

        let connector = installation.connector.as_ref();

        let currency = validate_currency(connector, self.rate).map_err(|e| e.at(Stage::Currency))?;
        tracing::info!("Currency validated");
        writeln!(out, "{}", currency)?;
        writeln!(out)?;

        let statistics =
            collect_statistics(connector, &installation.names).map_err(|e| e.at(Stage::Statistics))?;
        tracing::info!(products = statistics.total, "Statistics reported");
        write!(out, "{}", statistics)?;
        if statistics.flag.is_converted() {
            writeln!(out, "Warning: prices were already converted; another commit divides them again.")?;
        }
        writeln!(out)?;

        let missing = match missing_backups(connector, &installation.names, self.tables) {
            Ok(missing) => {
                if missing.is_empty() {
                    writeln!(out, "Backups: present")?;
                } else {
                    writeln!(out, "Warning: no backup for {}. Run `backup` first to be able to restore.", missing.join(", "))?;
                }
                Some(missing)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backup check failed");
                writeln!(out, "Warning: could not check backups: {}", e)?;
                None
            }
        };
        writeln!(out)?;

        let run = if mode == ConversionMode::Inspect {
            ConversionRun::new(mode)
        } else {
            let mut conn = connector
                .connect()
                .map_err(|e| ConvertError::Connection(e).at(Stage::Recalculation))?;
            recalculate(conn.as_mut(), &installation.names, self.tables, self.rate, mode)
                .map_err(|e| e.at(Stage::Recalculation))?
        };

        let state = match mode {
            ConversionMode::Inspect => {
                writeln!(out, "Ready. Preview with `recalculate simulate`, apply with `recalculate commit`.")?;
                LifecycleState::Inspected
            }
            ConversionMode::Simulate => {
                write!(out, "{}", run)?;
                writeln!(out, "Simulation only: {} prices would be converted, nothing was written.", run.converted())?;
                LifecycleState::Simulated
            }
            ConversionMode::Commit => {
                write!(out, "{}", run)?;
                writeln!(out, "Conversion committed: {} prices converted.", run.converted())?;
                writeln!(out, "Next: switch the store's default currency to EUR.")?;
                LifecycleState::Committed
            }
        };

        tracing::info!(state = ?state, "Lifecycle finished");
        Ok(LifecycleReport {
            state,
            installation,
            currency,
            statistics,
            missing_backups: missing,
            run,
        })
    }
}
