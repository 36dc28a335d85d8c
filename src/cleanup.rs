use std::fmt::{self, Display};

use bgn2eur_core::{MonetaryTable, TableNames};

use crate::{
    error::{ConvertError, StructuralStep},
    storage::Connector,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub dropped: Vec<String>,
    pub skipped: Vec<String>,
}

impl Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dropped.is_empty() {
            return writeln!(f, "No backups found, nothing to remove.");
        }
        writeln!(f, "Removed {} backup table(s):", self.dropped.len())?;
        for table in &self.dropped {
            writeln!(f, "  {}", table)?;
        }
        Ok(())
    }
}

/// Drops every backup that exists. Missing backups are skipped.
pub fn drop_backups(
    connector: &dyn Connector,
    names: &TableNames,
    tables: &[MonetaryTable],
) -> Result<CleanupReport, ConvertError> {
    let mut conn = connector.connect().map_err(ConvertError::Connection)?;
    let mut report = CleanupReport::default();

    for table in tables {
        let backup = names.backup(table.name);
        if !conn.table_exists(&backup)? {
            tracing::debug!(table = %backup, "No backup to drop");
            report.skipped.push(backup);
            continue;
        }
        conn.drop_table(&backup)
            .map_err(|source| ConvertError::Structural {
                table: backup.clone(),
                step: StructuralStep::DropBackup,
                completed: report.dropped.clone(),
                source,
            })?;
        tracing::info!(table = %backup, "Backup dropped");
        report.dropped.push(backup);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::create_backups;
    use bgn2eur_core::MONETARY_TABLES;
    use bgn2eur_memory::{FailOp, MemoryCatalog};

    #[test]
    fn test_nothing_to_drop() {
        let catalog = MemoryCatalog::with_catalog("oc_");
        let report = drop_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();
        assert!(report.dropped.is_empty());
        assert_eq!(report.skipped.len(), 4);
        assert!(catalog.journal().is_empty());
    }

    #[test]
    fn test_drops_only_present_backups() {
        let catalog = MemoryCatalog::with_catalog("oc_");
        create_backups(&catalog, catalog.names(), &MONETARY_TABLES[..2]).unwrap();

        let report = drop_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();

        assert_eq!(report.dropped, vec!["oc_backup_product", "oc_backup_product_option_value"]);
        assert_eq!(report.skipped, vec!["oc_backup_product_discount", "oc_backup_product_special"]);
        assert!(catalog.table_names().iter().all(|t| !t.contains("backup_")));
    }

    #[test]
    fn test_drop_failure_stops_immediately() {
        let catalog = MemoryCatalog::with_catalog("oc_");
        create_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap();
        catalog.fail_on(FailOp::Drop, "oc_backup_product_option_value");

        let err = drop_backups(&catalog, catalog.names(), &MONETARY_TABLES).unwrap_err();

        assert!(matches!(err, ConvertError::Structural { step: StructuralStep::DropBackup, .. }));
        assert!(!catalog.has_table("oc_backup_product"));
        assert!(catalog.has_table("oc_backup_product_discount"));
    }
}
