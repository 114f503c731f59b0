//! Application state shared between services.

use std::{path::Path, sync::Arc};

use parking_lot::RwLock;

use crate::{
    config::{Config, ConfigManager},
    drivers::HidDriver,
};

/// Shared application state containing all runtime data.
///
/// Holds the loaded configuration and the drivers bound at startup. Removing
/// a driver from here is what ends its device session once the export layer
/// has let go of it too.
pub struct AppState {
    /// Configuration manager for centralized config handling
    pub config_manager: Arc<ConfigManager>,
    drivers: RwLock<Vec<Arc<dyn HidDriver>>>,
}

impl AppState {
    pub fn new(config_manager: ConfigManager, drivers: Vec<Arc<dyn HidDriver>>) -> Self {
        Self {
            config_manager: Arc::new(config_manager),
            drivers: RwLock::new(drivers),
        }
    }

    pub fn config(&self) -> &Config {
        self.config_manager.config()
    }

    /// Snapshot of the live drivers in probe order.
    pub fn drivers(&self) -> Vec<Arc<dyn HidDriver>> {
        self.drivers.read().clone()
    }

    /// Forgets the driver bound to `device`.
    pub fn remove_driver(&self, device: &Path) -> Option<Arc<dyn HidDriver>> {
        let mut drivers = self.drivers.write();
        let idx = drivers.iter().position(|d| d.device_path() == device)?;
        Some(drivers.remove(idx))
    }

    /// Forgets every driver, returning them so the caller decides when they drop.
    pub fn take_drivers(&self) -> Vec<Arc<dyn HidDriver>> {
        std::mem::take(&mut *self.drivers.write())
    }
}
