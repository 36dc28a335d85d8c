//! Restore manager.
//!
//! Each table is swapped back by renaming live to the holding name, renaming
//! the backup to the live name and dropping the holding table. Backends that
//! rename atomically do both renames in one statement. The live name is
//! occupied after every statement.
//!
//! The sequence across tables is not atomic. Tables already put back are
//! recorded under [`RESTORE_PROGRESS_KEY`] so that running restore again
//! after a failure finishes the remaining tables instead of refusing.

use std::fmt::{self, Display};

use bgn2eur_core::{MonetaryTable, TableNames, RESTORE_PROGRESS_KEY};

use crate::{
    error::{ConvertError, StructuralStep},
    flag::ConversionFlag,
    storage::{CatalogBackend, Connector},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Live tables now holding their backup's rows, in restore order.
    pub restored: Vec<String>,
    /// Live tables an earlier, interrupted restore had already put back.
    pub already_restored: Vec<String>,
    /// Set when the flag could not be reset; the restore itself succeeded.
    pub flag_warning: Option<String>,
}

impl RestoreReport {
    /// Every live table put back so far, by this run or an earlier one.
    fn done(&self) -> Vec<String> {
        self.already_restored.iter().chain(&self.restored).cloned().collect()
    }
}

impl Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Restore completed:")?;
        for table in &self.already_restored {
            writeln!(f, "  {} restored by an earlier run", table)?;
        }
        for table in &self.restored {
            writeln!(f, "  {} restored", table)?;
        }
        if let Some(warning) = &self.flag_warning {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}

/// What restore does with one table, decided before anything is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TablePlan {
    Swap,
    /// The backup is live already and only the holding table is left over.
    FinishSwap,
    AlreadyRestored,
}

fn recorded_progress(conn: &mut dyn CatalogBackend) -> Vec<String> {
    match conn.settings().get(RESTORE_PROGRESS_KEY) {
        Ok(value) => value
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            tracing::warn!(key = RESTORE_PROGRESS_KEY, error = %e, "Could not read restore progress");
            Vec::new()
        }
    }
}

fn record_progress(conn: &mut dyn CatalogBackend, done: &[String]) {
    if let Err(e) = conn.settings().put(RESTORE_PROGRESS_KEY, &done.join(",")) {
        tracing::warn!(key = RESTORE_PROGRESS_KEY, error = %e, "Could not record restore progress");
    }
}

/// Fails without touching anything unless every table can be restored or was restored already.
fn plan_restore(
    conn: &mut dyn CatalogBackend,
    names: &TableNames,
    tables: &[MonetaryTable],
) -> Result<Vec<TablePlan>, ConvertError> {
    let progress = recorded_progress(conn);
    let mut plan = Vec::with_capacity(tables.len());
    for table in tables {
        let live = names.live(table.name);
        let backup = names.backup(table.name);
        let holding = names.holding(table.name);

        let has_backup = conn.table_exists(&backup)?;
        let has_holding = conn.table_exists(&holding)?;
        let step = match (has_backup, has_holding) {
            (true, false) => TablePlan::Swap,
            (true, true) => return Err(ConvertError::HoldingTableExists(holding)),
            (false, true) if conn.table_exists(&live)? => TablePlan::FinishSwap,
            (false, true) => return Err(ConvertError::LiveTableMissing { table: live, holding }),
            (false, false) if progress.contains(&live) => TablePlan::AlreadyRestored,
            (false, false) => return Err(ConvertError::BackupMissing(backup)),
        };
        plan.push(step);
    }
    Ok(plan)
}

fn swap_names(
    conn: &mut dyn CatalogBackend,
    live: &str,
    backup: &str,
    holding: &str,
    restored: &[String],
) -> Result<(), ConvertError> {
    if conn.renames_atomically() {
        return conn
            .rename_tables(&[(live, holding), (backup, live)])
            .map_err(|source| ConvertError::RestoreFailed {
                table: live.to_string(),
                restored: restored.to_vec(),
                rolled_back: true,
                source,
            });
    }

    conn.rename_table(live, holding)
        .map_err(|source| ConvertError::RestoreFailed {
            table: live.to_string(),
            restored: restored.to_vec(),
            rolled_back: true,
            source,
        })?;

    if let Err(source) = conn.rename_table(backup, live) {
        let rolled_back = match conn.rename_table(holding, live) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(table = %live, holding = %holding, error = %e, "Rollback rename failed");
                false
            }
        };
        return Err(ConvertError::RestoreFailed {
            table: live.to_string(),
            restored: restored.to_vec(),
            rolled_back,
            source,
        });
    }
    Ok(())
}

/// Hands sequences over to the restored table and drops the holding table.
fn finish_swap(
    conn: &mut dyn CatalogBackend,
    live: &str,
    holding: &str,
    restored: &[String],
) -> Result<(), ConvertError> {
    let completed = || -> Vec<String> {
        restored
            .iter()
            .cloned()
            .chain(std::iter::once(live.to_string()))
            .collect()
    };

    conn.adopt_dependents(holding, live)
        .map_err(|source| ConvertError::Structural {
            table: holding.to_string(),
            step: StructuralStep::AdoptDependents,
            completed: completed(),
            source,
        })?;

    conn.drop_table(holding)
        .map_err(|source| ConvertError::Structural {
            table: holding.to_string(),
            step: StructuralStep::DropHolding,
            completed: completed(),
            source,
        })
}

/// Swaps every backup back into its live name and marks the catalog as not converted.
pub fn restore_from_backups(
    connector: &dyn Connector,
    names: &TableNames,
    tables: &[MonetaryTable],
) -> Result<RestoreReport, ConvertError> {
    let mut conn = connector.connect().map_err(ConvertError::Connection)?;
    let plan = plan_restore(conn.as_mut(), names, tables)?;

    let mut report = RestoreReport::default();
    for (table, step) in tables.iter().zip(plan) {
        let live = names.live(table.name);
        let backup = names.backup(table.name);
        let holding = names.holding(table.name);

        match step {
            TablePlan::AlreadyRestored => {
                tracing::info!(table = %live, "Table was restored by an earlier run");
                report.already_restored.push(live);
                continue;
            }
            TablePlan::Swap => {
                let done = report.done();
                swap_names(conn.as_mut(), &live, &backup, &holding, &done)?;
                // From here on the backup is live; record it before the holding table can fail.
                record_progress(conn.as_mut(), &[done, vec![live.clone()]].concat());
            }
            TablePlan::FinishSwap => {
                tracing::info!(table = %live, holding = %holding, "Finishing interrupted restore");
            }
        }

        finish_swap(conn.as_mut(), &live, &holding, &report.done())?;
        tracing::info!(table = %live, "Table restored from backup");
        report.restored.push(live);
        record_progress(conn.as_mut(), &report.done());
    }

    if let Err(e) = conn.settings().delete(RESTORE_PROGRESS_KEY) {
        tracing::warn!(key = RESTORE_PROGRESS_KEY, error = %e, "Could not clear restore progress");
    }

    if let Err(e) = ConversionFlag::new(conn.settings()).mark_restored() {
        tracing::warn!(error = %e, "Could not reset conversion flag after restore");
        report.flag_warning = Some(format!("conversion flag could not be reset: {}", e));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::create_backups;
    use bgn2eur_core::{CONVERSION_FLAG_KEY, MONETARY_TABLES};
    use bgn2eur_memory::{FailOp, MemoryCatalog, Value};
    use rust_decimal_macros::dec;

    fn backed_up() -> MemoryCatalog {
        let catalog = MemoryCatalog::with_catalog("oc_");
        catalog.insert(
            "product",
            vec![("product_id", Value::Int(1)), ("price", dec!(10.00).into()), ("status", Value::Int(1))],
        );
        create_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();
        catalog
    }

    fn renames(catalog: &MemoryCatalog) -> usize {
        catalog.journal().iter().filter(|e| e.starts_with("rename")).count()
    }

    #[test]
    fn test_missing_backup_means_no_mutation() {
        let catalog = backed_up();
        let mut conn = catalog.connect().unwrap();
        conn.drop_table("oc_backup_product_discount").unwrap();
        drop(conn);

        let err = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();

        assert!(matches!(err, ConvertError::BackupMissing(ref t) if t == "oc_backup_product_discount"));
        assert_eq!(renames(&catalog), 0);
        assert_eq!(catalog.setting(CONVERSION_FLAG_KEY), None);
    }

    #[test]
    fn test_occupied_holding_name_means_no_mutation() {
        let catalog = backed_up();
        catalog.create_table("old_product_special", &["product_special_id"]);

        let err = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();

        assert!(matches!(err, ConvertError::HoldingTableExists(_)));
        assert_eq!(renames(&catalog), 0);
    }

    #[test]
    fn test_restore_swaps_and_marks_flag() {
        let catalog = backed_up();
        let mut conn = catalog.connect().unwrap();
        conn.update_price("oc_product", &bgn2eur_core::catalog::PRODUCT, 1, dec!(5.11)).unwrap();
        drop(conn);

        let report = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();

        assert_eq!(report.restored.len(), 4);
        assert_eq!(report.flag_warning, None);
        assert_eq!(catalog.price("oc_product", "product_id", 1), Some(dec!(10.00)));
        assert!(!catalog.has_table("oc_backup_product"));
        assert!(!catalog.has_table("oc_old_product"));
        assert_eq!(catalog.setting(CONVERSION_FLAG_KEY).as_deref(), Some("0"));
        assert_eq!(catalog.open_connections(), 0);
    }

    #[test]
    fn test_second_rename_failure_rolls_back_that_table() {
        let catalog = backed_up();
        catalog.fail_on(FailOp::Rename, "oc_backup_product_discount");

        let err = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();

        match err {
            ConvertError::RestoreFailed { table, restored, rolled_back, .. } => {
                assert_eq!(table, "oc_product_discount");
                assert_eq!(restored, vec!["oc_product", "oc_product_option_value"]);
                assert!(rolled_back);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(catalog.has_table("oc_product_discount"));
        assert!(catalog.has_table("oc_backup_product_discount"));
        assert!(!catalog.has_table("oc_old_product_discount"));
        assert!(catalog.has_table("oc_backup_product_special"));
        assert_eq!(catalog.setting(CONVERSION_FLAG_KEY), None);
    }

    #[test]
    fn test_restore_resumes_after_failure_mid_sequence() {
        let catalog = backed_up();
        catalog.fail_on(FailOp::Rename, "oc_backup_product_discount");
        restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();
        assert_eq!(
            catalog.setting(RESTORE_PROGRESS_KEY).as_deref(),
            Some("oc_product,oc_product_option_value")
        );

        catalog.clear_failures();
        let report = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();

        assert_eq!(report.already_restored, vec!["oc_product", "oc_product_option_value"]);
        assert_eq!(report.restored, vec!["oc_product_discount", "oc_product_special"]);
        assert!(catalog.table_names().iter().all(|t| !t.contains("backup_") && !t.contains("old_")));
        assert_eq!(catalog.setting(RESTORE_PROGRESS_KEY), None);
        assert_eq!(catalog.setting(CONVERSION_FLAG_KEY).as_deref(), Some("0"));
    }

    #[test]
    fn test_restore_resumes_after_holding_drop_failure() {
        let catalog = backed_up();
        catalog.fail_on(FailOp::Drop, "oc_old_product_option_value");

        let err = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();

        match err {
            ConvertError::Structural { table, step, completed, .. } => {
                assert_eq!(table, "oc_old_product_option_value");
                assert_eq!(step, StructuralStep::DropHolding);
                assert_eq!(completed, vec!["oc_product", "oc_product_option_value"]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(catalog.has_table("oc_old_product_option_value"));
        assert!(!catalog.has_table("oc_backup_product_option_value"));

        catalog.clear_failures();
        let report = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();

        assert_eq!(report.already_restored, vec!["oc_product"]);
        assert_eq!(report.restored.len(), 3);
        assert!(!catalog.has_table("oc_old_product_option_value"));
        assert!(catalog
            .journal()
            .iter()
            .any(|e| e == "adopt oc_old_product_option_value -> oc_product_option_value"));
    }

    #[test]
    fn test_live_table_missing_next_to_holding() {
        let catalog = backed_up();
        let mut conn = catalog.connect().unwrap();
        conn.drop_table("oc_backup_product").unwrap();
        conn.rename_table("oc_product", "oc_old_product").unwrap();
        drop(conn);
        let before = renames(&catalog);

        let err = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();

        assert!(matches!(
            err,
            ConvertError::LiveTableMissing { ref table, ref holding } if table == "oc_product" && holding == "oc_old_product"
        ));
        assert_eq!(renames(&catalog), before);
    }

    #[test]
    fn test_dependents_adopted_before_holding_dropped() {
        let catalog = backed_up();
        restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();

        let journal = catalog.journal();
        let position = |entry: &str| journal.iter().position(|e| e == entry).unwrap();
        assert!(position("adopt oc_old_product -> oc_product") < position("drop oc_old_product"));
        assert!(position("rename oc_backup_product -> oc_product") < position("adopt oc_old_product -> oc_product"));
    }

    #[test]
    fn test_adopt_failure_keeps_holding_table() {
        let catalog = backed_up();
        catalog.fail_on(FailOp::AdoptDependents, "oc_old_product");

        let err = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();

        assert!(matches!(err, ConvertError::Structural { step: StructuralStep::AdoptDependents, .. }));
        assert!(catalog.has_table("oc_old_product"));
        assert_eq!(catalog.setting(RESTORE_PROGRESS_KEY).as_deref(), Some("oc_product"));
    }

    #[test]
    fn test_atomic_rename_failure_leaves_table_untouched() {
        let catalog = backed_up();
        catalog.set_atomic_renames(true);
        catalog.fail_on(FailOp::Rename, "oc_backup_product_discount");

        let err = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();

        match err {
            ConvertError::RestoreFailed { table, restored, rolled_back, .. } => {
                assert_eq!(table, "oc_product_discount");
                assert_eq!(restored, vec!["oc_product", "oc_product_option_value"]);
                assert!(rolled_back);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(catalog.has_table("oc_product_discount"));
        assert!(catalog.has_table("oc_backup_product_discount"));
        assert!(!catalog.has_table("oc_old_product_discount"));
        assert!(!catalog.journal().iter().any(|e| e == "rename oc_product_discount -> oc_old_product_discount"));
    }

    #[test]
    fn test_flag_failure_does_not_fail_restore() {
        let catalog = backed_up();
        catalog.fail_on(FailOp::WriteSetting, CONVERSION_FLAG_KEY);

        let report = restore_from_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();

        assert_eq!(report.restored.len(), 4);
        assert!(report.flag_warning.is_some());
    }
}
