//! Application state provider for dependency injection.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    app_context::AppState,
    config::ConfigManager,
    drivers::{self, HidDriver},
    event::EventBus,
    hid::{DeviceCatalog, HidapiCatalog},
    providers::traits::AsyncProvider,
};

/// Builds the device catalog used for the one-shot startup enumeration.
pub type CatalogFactory = Box<dyn Fn() -> Result<Box<dyn DeviceCatalog>> + Send + Sync>;

/// Provider for creating and initializing application state.
///
/// Enumerates devices once and binds a driver to every device one claims.
/// The drivers are returned idle; the coordinator starts their sessions.
pub struct AppStateProvider {
    config_manager: ConfigManager,
    event_bus: EventBus,
    catalog: CatalogFactory,
}

impl AppStateProvider {
    /// Creates a provider that enumerates through hidapi.
    pub fn new(config_manager: ConfigManager, event_bus: EventBus) -> Self {
        Self {
            config_manager,
            event_bus,
            catalog: Box::new(|| Ok(Box::new(HidapiCatalog::new()?) as Box<dyn DeviceCatalog>)),
        }
    }

    /// Replaces the device catalog.
    pub fn with_catalog(mut self, catalog: CatalogFactory) -> Self {
        self.catalog = catalog;
        self
    }

    fn probe(&self) -> Result<Vec<Arc<dyn HidDriver>>> {
        let catalog = (self.catalog)()?;
        drivers::probe_all(
            catalog.as_ref(),
            self.config_manager.config().max_report_size,
            &self.event_bus,
        )
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let drivers = self.probe()?;
        Ok(Arc::new(AppState::new(self.config_manager.clone(), drivers)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        hid::{DeviceDescriptor, discovery::MockDeviceCatalog},
    };

    fn catalog_of(devices: Vec<DeviceDescriptor>) -> CatalogFactory {
        Box::new(move || {
            let devices = devices.clone();
            let mut catalog = MockDeviceCatalog::new();
            catalog
                .expect_devices()
                .returning(move || Ok(devices.clone()));
            Ok(Box::new(catalog) as Box<dyn DeviceCatalog>)
        })
    }

    #[tokio::test]
    async fn provides_state_without_matching_devices() {
        let provider = AppStateProvider::new(
            ConfigManager::new(Config::default(), None),
            EventBus::new(),
        )
        .with_catalog(catalog_of(vec![DeviceDescriptor::new(
            "/dev/hidraw7",
            0x046d,
            0xc52b,
        )]));

        let state = provider.provide().await.unwrap();
        assert!(state.drivers().is_empty());
    }

    #[tokio::test]
    async fn catalog_failure_fails_provide() {
        let provider = AppStateProvider::new(
            ConfigManager::new(Config::default(), None),
            EventBus::new(),
        )
        .with_catalog(Box::new(|| Err(anyhow::anyhow!("hidapi unavailable"))));

        assert!(provider.provide().await.is_err());
    }
}
