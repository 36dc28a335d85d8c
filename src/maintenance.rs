use clap::ValueEnum;

use bgn2eur_core::MAINTENANCE_KEY;

use crate::{error::ConvertError, storage::Connector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MaintenanceAction {
    Enable,
    Disable,
}

impl MaintenanceAction {
    fn value(&self) -> &'static str {
        match self {
            MaintenanceAction::Enable => "1",
            MaintenanceAction::Disable => "0",
        }
    }
}

/// Switches the storefront's maintenance mode. The setting must already exist.
pub fn set_maintenance(connector: &dyn Connector, action: MaintenanceAction) -> Result<(), ConvertError> {
    let mut conn = connector.connect().map_err(ConvertError::Connection)?;
    let updated = conn.settings().update(MAINTENANCE_KEY, action.value())?;
    if !updated {
        return Err(ConvertError::ConfigurationMissing(format!(
            "setting {} not found",
            MAINTENANCE_KEY
        )));
    }
    tracing::info!(action = ?action, "Maintenance mode changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgn2eur_memory::MemoryCatalog;

    #[test]
    fn test_toggle_existing_setting() {
        let catalog = MemoryCatalog::with_catalog("oc_");
        catalog.set_setting(MAINTENANCE_KEY, "0");

        set_maintenance(&catalog, MaintenanceAction::Enable).unwrap();
        assert_eq!(catalog.setting(MAINTENANCE_KEY).as_deref(), Some("1"));

        set_maintenance(&catalog, MaintenanceAction::Disable).unwrap();
        assert_eq!(catalog.setting(MAINTENANCE_KEY).as_deref(), Some("0"));
    }

    #[test]
    fn test_missing_setting_is_an_error() {
        let catalog = MemoryCatalog::with_catalog("oc_");
        let err = set_maintenance(&catalog, MaintenanceAction::Enable).unwrap_err();
        assert!(err.to_string().contains(MAINTENANCE_KEY));
        assert_eq!(catalog.setting(MAINTENANCE_KEY), None);
    }
}
