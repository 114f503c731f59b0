//! D-Bus service provider: exports drivers and their channels.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio_util::sync::CancellationToken;
use zbus::{Connection, fdo::ObjectManager, object_server::ObjectServer};
use zvariant::OwnedObjectPath;

use crate::{
    app_context::AppState,
    config::BusKind,
    drivers::HidDriver,
    event::{Event, EventBus},
    interface::{DaemonInterface, DriverInterface, FanInterface, HidDeviceInterface},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// D-Bus service provider for external system integration.
///
/// Serves an object manager and the daemon object at the configured root,
/// one object per driver below it and one per channel below each driver:
///
/// ```text
/// /org/liquidctl/LiquidD                     Daemon, ObjectManager
/// /org/liquidctl/LiquidD/NzxtSmart2          Driver, HidDevice
/// /org/liquidctl/LiquidD/NzxtSmart2/fan1     Fan
/// /org/liquidctl/LiquidD/NzxtSmart2_1        second controller of the same type
/// ```
///
/// Telemetry events become `PropertiesChanged` signals; a device error
/// removes that driver's objects, and so does stopping the service.
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
    events: Mutex<Option<Receiver<Event>>>,
    connection: Connection,
}

impl DBusServiceProvider {
    /// Connects to the bus selected in the configuration.
    ///
    /// `events` must be subscribed before any device session starts, so a
    /// session that fails while the connection is being set up is still seen.
    pub async fn new(
        state: Arc<AppState>,
        event_bus: EventBus,
        events: Receiver<Event>,
    ) -> Result<Self> {
        let connection = match state.config().bus {
            BusKind::Session => Connection::session().await,
            BusKind::System => Connection::system().await,
        }
        .context("D-Bus connection")?;

        Ok(Self {
            state,
            event_bus,
            events: Mutex::new(Some(events)),
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let events = self
            .events
            .lock()
            .take()
            .context("D-Bus service already started")?;
        let event_bus = self.event_bus.clone();
        let connection = self.connection.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_dbus_service(state, event_bus, events, connection, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }

    fn is_critical(&self) -> bool {
        true
    }
}

/// Object paths of one exported driver.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExportedDriver {
    path: OwnedObjectPath,
    has_ids: bool,
    channels: HashMap<String, OwnedObjectPath>,
}

/// Object names for drivers in export order: the type name, then
/// `<type>_1`, `<type>_2`, ... for further drivers of the same type.
fn object_names<'a>(type_names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    type_names
        .into_iter()
        .map(|type_name| {
            let n = seen.entry(type_name).or_insert(0);
            let name = match *n {
                0 => type_name.to_string(),
                n => format!("{type_name}_{n}"),
            };
            *n += 1;
            name
        })
        .collect()
}

fn child_path(parent: &str, name: &str) -> Result<OwnedObjectPath> {
    OwnedObjectPath::try_from(format!("{parent}/{name}"))
        .with_context(|| format!("'{name}' is not a valid object path element"))
}

async fn export_driver(
    server: &ObjectServer,
    root: &str,
    name: &str,
    driver: &Arc<dyn HidDriver>,
) -> Result<ExportedDriver> {
    let path = child_path(root, name)?;
    server
        .at(path.as_str(), DriverInterface::new(driver))
        .await?;

    let has_ids = match driver.descriptor() {
        Some(descriptor) => {
            server
                .at(path.as_str(), HidDeviceInterface::from(descriptor))
                .await?;
            true
        }
        None => false,
    };

    let mut channels = Vec::new();
    driver.for_each_channel(&mut |channel_name, channel| {
        channels.push((channel_name.to_string(), channel.clone()));
    });

    let mut exported = HashMap::new();
    for (channel_name, channel) in channels {
        let channel_path = child_path(path.as_str(), &channel_name)?;
        server
            .at(channel_path.as_str(), FanInterface::new(channel))
            .await?;
        exported.insert(channel_name, channel_path);
    }

    info!(
        "Exported {} at {} ({} channel(s))",
        driver.device_path().display(),
        path.as_str(),
        exported.len()
    );

    Ok(ExportedDriver {
        path,
        has_ids,
        channels: exported,
    })
}

async fn unexport_driver(server: &ObjectServer, exported: &ExportedDriver) -> zbus::Result<()> {
    for path in exported.channels.values() {
        server.remove::<FanInterface, _>(path.as_str()).await?;
    }
    if exported.has_ids {
        server
            .remove::<HidDeviceInterface, _>(exported.path.as_str())
            .await?;
    }
    server
        .remove::<DriverInterface, _>(exported.path.as_str())
        .await?;
    Ok(())
}

async fn telemetry_changed(server: &ObjectServer, path: &OwnedObjectPath) -> zbus::Result<()> {
    let iface_ref = server.interface::<_, FanInterface>(path.as_str()).await?;
    let iface = iface_ref.get().await;
    let emitter = iface_ref.signal_emitter();

    iface.rpm_changed(emitter).await?;
    iface.duty_percent_changed(emitter).await?;
    iface.fan_type_changed(emitter).await
}

/// Looks up the channel object for a telemetry event.
fn channel_path<'a>(
    exported: &'a HashMap<PathBuf, ExportedDriver>,
    device: &Path,
    channel: &str,
) -> Option<&'a OwnedObjectPath> {
    exported.get(device)?.channels.get(channel)
}

async fn run_dbus_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    mut events: Receiver<Event>,
    connection: Connection,
    cancel_token: CancellationToken,
) -> Result<()> {
    let config = state.config().clone();
    let server = connection.object_server();

    server.at(config.object_root.as_str(), ObjectManager).await?;
    server
        .at(
            config.object_root.as_str(),
            DaemonInterface::new(env!("CARGO_PKG_VERSION").to_string(), event_bus),
        )
        .await?;

    let drivers = state.drivers();
    let names = object_names(drivers.iter().map(|d| d.type_name()));
    let mut exported = HashMap::new();
    for (driver, name) in drivers.iter().zip(&names) {
        let paths = export_driver(server, &config.object_root, name, driver).await?;
        exported.insert(driver.device_path().to_path_buf(), paths);
    }
    drop(drivers);

    connection
        .request_name(config.bus_name.as_str())
        .await
        .with_context(|| format!("request name {}", config.bus_name))?;
    info!("D-Bus name {} acquired", config.bus_name);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("D-Bus service cancelled");
                break;
            }

            event = events.recv() => match event {
                Ok(Event::TelemetryUpdated { device, channel }) => {
                    if let Some(path) = channel_path(&exported, &device, &channel) {
                        if let Err(e) = telemetry_changed(server, path).await {
                            debug!("PropertiesChanged for {}: {e}", path.as_str());
                        }
                    }
                }
                Ok(Event::DeviceError { device, .. }) => {
                    if let Some(paths) = exported.remove(&device) {
                        info!("Removing {} from the bus", paths.path.as_str());
                        if let Err(e) = unexport_driver(server, &paths).await {
                            warn!("Failed to remove {}: {e}", paths.path.as_str());
                        }
                    }
                }
                Ok(Event::SystemShutdown) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!("D-Bus service lagged by {n} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    for paths in exported.values() {
        if let Err(e) = unexport_driver(server, paths).await {
            warn!("Failed to remove {}: {e}", paths.path.as_str());
        }
    }
    debug!("Removed {} driver object(s) from the bus", exported.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager},
        drivers::{dispatcher::DriverParams, nzxt_smart2::NzxtSmart2},
        hid::{HidDevice, testing::MockIo},
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn object_names_suffix_repeated_types() {
        assert_eq!(
            object_names(["NzxtSmart2", "Other", "NzxtSmart2", "NzxtSmart2"]),
            vec!["NzxtSmart2", "Other", "NzxtSmart2_1", "NzxtSmart2_2"]
        );
        assert!(object_names([]).is_empty());
    }

    #[test]
    fn child_paths_are_validated() {
        assert_eq!(
            child_path("/org/liquidctl/LiquidD", "NzxtSmart2")
                .unwrap()
                .as_str(),
            "/org/liquidctl/LiquidD/NzxtSmart2"
        );
        assert!(child_path("/org/liquidctl/LiquidD", "fan-1").is_err());
    }

    #[test]
    fn telemetry_events_map_to_channel_objects() {
        let mut exported = HashMap::new();
        exported.insert(
            PathBuf::from("/dev/hidraw3"),
            ExportedDriver {
                path: child_path("/r", "NzxtSmart2").unwrap(),
                has_ids: true,
                channels: HashMap::from([(
                    "fan2".to_string(),
                    child_path("/r/NzxtSmart2", "fan2").unwrap(),
                )]),
            },
        );

        assert_eq!(
            channel_path(&exported, Path::new("/dev/hidraw3"), "fan2").map(|p| p.as_str()),
            Some("/r/NzxtSmart2/fan2")
        );
        assert!(channel_path(&exported, Path::new("/dev/hidraw3"), "fan9").is_none());
        assert!(channel_path(&exported, Path::new("/dev/hidraw4"), "fan2").is_none());
    }

    #[tokio::test]
    async fn dbus_service_provider_creation() {
        let (io, _feed) = MockIo::new();
        let driver: Arc<dyn HidDriver> = Arc::new(NzxtSmart2::new(DriverParams::new(
            HidDevice::from_io(io, "/dev/hidraw-mock", 64),
        )));
        let state = Arc::new(AppState::new(
            ConfigManager::new(Config::default(), None),
            vec![driver],
        ));

        let bus = EventBus::new();
        let events = bus.subscribe();

        // A session bus may not exist where tests run.
        match DBusServiceProvider::new(state, bus, events).await {
            Ok(provider) => {
                assert_eq!(provider.name(), "DBusService");
                assert_eq!(provider.priority(), 8);
                assert!(provider.is_critical());
                assert!(provider.events.lock().is_some());
            }
            Err(e) => debug!("D-Bus not available in test environment: {e}"),
        }
    }
}
