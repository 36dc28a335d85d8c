//! Backup manager.
//!
//! Backups are full row copies of each monetary table under the
//! `{prefix}backup_{table}` name. A failure part way through does not remove
//! backups already made for earlier tables.

use std::{
    fmt::{self, Display},
    ops::{Deref, DerefMut},
};

use bgn2eur_core::{MonetaryTable, TableNames, RESTORE_PROGRESS_KEY};

use crate::{
    error::{ConvertError, StructuralStep},
    storage::{CatalogBackend, Connector, SchemaMode},
};

/// Holds a connection in relaxed schema mode and puts the previous mode back when dropped.
///
/// Relaxing is best effort: a session that may not change the mode (PostgreSQL's
/// `session_replication_role` needs superuser) keeps its strict mode and nothing
/// is put back on drop.
pub struct RelaxedSchema<'a> {
    conn: &'a mut dyn CatalogBackend,
    previous: Option<SchemaMode>,
}

impl<'a> RelaxedSchema<'a> {
    pub fn acquire(conn: &'a mut dyn CatalogBackend) -> Self {
        let previous = match conn.relax_schema_mode() {
            Ok(previous) => {
                tracing::debug!(previous = %previous.0, "Relaxed schema mode");
                Some(previous)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not relax schema mode, continuing in strict mode");
                None
            }
        };
        Self { conn, previous }
    }

    /// Whether the session actually runs in relaxed mode.
    pub fn is_relaxed(&self) -> bool {
        self.previous.is_some()
    }
}

impl<'a> Deref for RelaxedSchema<'a> {
    type Target = dyn CatalogBackend + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.conn
    }
}

impl<'a> DerefMut for RelaxedSchema<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.conn
    }
}

impl Drop for RelaxedSchema<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        match self.conn.restore_schema_mode(&previous) {
            Ok(()) => tracing::debug!(mode = %previous.0, "Restored schema mode"),
            Err(e) => tracing::warn!(mode = %previous.0, error = %e, "Failed to restore schema mode"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub source: String,
    pub backup: String,
    pub rows: u64,
    /// A backup from an earlier run was dropped first.
    pub replaced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub tables: Vec<BackupEntry>,
    /// False when the session kept its strict schema mode.
    pub relaxed: bool,
}

impl BackupReport {
    fn completed(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.backup.clone()).collect()
    }

    pub fn rows_for(&self, backup: &str) -> Option<u64> {
        self.tables.iter().find(|t| t.backup == backup).map(|t| t.rows)
    }
}

impl Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backup created:")?;
        for entry in &self.tables {
            let note = if entry.replaced { " (replaced previous backup)" } else { "" };
            writeln!(f, "  {} -> {}: {} rows{}", entry.source, entry.backup, entry.rows, note)?;
        }
        if !self.relaxed {
            writeln!(f, "Note: strict schema mode could not be relaxed for this session.")?;
        }
        Ok(())
    }
}

/// Drops a backup left half-made by a failed clone or copy.
fn discard_partial(conn: &mut dyn CatalogBackend, backup: &str) {
    if let Ok(true) = conn.table_exists(backup) {
        if let Err(e) = conn.drop_table(backup) {
            tracing::warn!(table = backup, error = %e, "Could not drop incomplete backup");
        }
    }
}

/// Replaces the backup of every table in `tables`, in order.
pub fn create_backups(
    connector: &dyn Connector,
    names: &TableNames,
    tables: &[MonetaryTable],
) -> Result<BackupReport, ConvertError> {
    let mut conn = connector.connect().map_err(ConvertError::Connection)?;
    let mut session = RelaxedSchema::acquire(conn.as_mut());
    let mut report = BackupReport {
        relaxed: session.is_relaxed(),
        ..BackupReport::default()
    };

    for table in tables {
        let live = names.live(table.name);
        let backup = names.backup(table.name);

        let replaced = session.table_exists(&backup)?;
        if replaced {
            tracing::info!(table = %backup, "Dropping existing backup");
            session
                .drop_table(&backup)
                .map_err(|source| ConvertError::StaleBackup {
                    table: backup.clone(),
                    completed: report.completed(),
                    source,
                })?;
        }

        if let Err(source) = session.clone_structure(&live, &backup) {
            discard_partial(&mut *session, &backup);
            return Err(ConvertError::Structural {
                table: backup,
                step: StructuralStep::CloneStructure,
                completed: report.completed(),
                source,
            });
        }

        let rows = match session.copy_rows(&live, &backup) {
            Ok(rows) => rows,
            Err(source) => {
                discard_partial(&mut *session, &backup);
                return Err(ConvertError::Structural {
                    table: backup,
                    step: StructuralStep::CopyRows,
                    completed: report.completed(),
                    source,
                });
            }
        };

        tracing::info!(source = %live, backup = %backup, rows, "Backup created");
        report.tables.push(BackupEntry {
            source: live,
            backup,
            rows,
            replaced,
        });
    }

    // Fresh backups supersede whatever an interrupted restore recorded.
    if let Err(e) = session.settings().delete(RESTORE_PROGRESS_KEY) {
        tracing::warn!(key = RESTORE_PROGRESS_KEY, error = %e, "Could not clear restore progress");
    }

    Ok(report)
}

/// Backups that do not exist, used by the readiness check.
pub fn missing_backups(
    connector: &dyn Connector,
    names: &TableNames,
    tables: &[MonetaryTable],
) -> Result<Vec<String>, ConvertError> {
    let mut conn = connector.connect().map_err(ConvertError::Connection)?;
    let mut missing = Vec::new();
    for table in tables {
        let backup = names.backup(table.name);
        if !conn.table_exists(&backup)? {
            missing.push(backup);
        }
    }
    Ok(missing)
}
