//! D-Bus interfaces exported by the daemon.

use std::{
    path::PathBuf,
    sync::{Arc, Weak},
};

use log::{error, info};
use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::{
    drivers::{HidDriver, channel::ChannelHandle},
    event::{Event, EventBus},
    hid::{DeviceDescriptor, SessionState},
};

/// Root object: daemon-wide properties and control.
pub struct DaemonInterface {
    version: String,
    event_bus: EventBus,
}

impl DaemonInterface {
    pub fn new(version: String, event_bus: EventBus) -> Self {
        Self { version, event_bus }
    }
}

#[interface(name = "org.liquidctl.LiquidD.Daemon")]
impl DaemonInterface {
    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    async fn stop(&self, #[zbus(signal_emitter)] emitter: SignalEmitter<'_>) -> fdo::Result<()> {
        info!("Stop requested over D-Bus");
        emitter.stopped().await?;
        self.event_bus
            .publish(Event::SystemShutdown)
            .map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }
}

/// One bound driver.
///
/// Holds the driver weakly: the object server never keeps a device open
/// after the daemon has released it.
pub struct DriverInterface {
    driver: Weak<dyn HidDriver>,
    device_path: PathBuf,
}

impl DriverInterface {
    pub fn new(driver: &Arc<dyn HidDriver>) -> Self {
        Self {
            driver: Arc::downgrade(driver),
            device_path: driver.device_path().to_path_buf(),
        }
    }
}

#[interface(name = "org.liquidctl.LiquidD.Driver")]
impl DriverInterface {
    /// Sends the initialization sequence. Fails with the step that did not
    /// complete; the receive session keeps running either way.
    async fn init_device(&self) -> fdo::Result<()> {
        let driver = self.driver.upgrade().ok_or_else(|| {
            fdo::Error::Failed(format!("{} has been released", self.device_path.display()))
        })?;
        driver.init_device().map_err(|e| {
            error!("{}: {e}", self.device_path.display());
            fdo::Error::Failed(e.to_string())
        })
    }

    #[zbus(property)]
    pub(crate) async fn state(&self) -> String {
        self.driver
            .upgrade()
            .map_or(SessionState::Terminated, |driver| driver.state())
            .to_string()
    }

    #[zbus(property)]
    async fn device_path(&self) -> String {
        self.device_path.display().to_string()
    }
}

/// USB identity of a driver's device.
pub struct HidDeviceInterface {
    vendor_id: u16,
    product_id: u16,
}

impl From<&DeviceDescriptor> for HidDeviceInterface {
    fn from(d: &DeviceDescriptor) -> Self {
        Self {
            vendor_id: d.vendor_id,
            product_id: d.product_id,
        }
    }
}

#[interface(name = "org.liquidctl.LiquidD.HidDevice")]
impl HidDeviceInterface {
    #[zbus(property)]
    async fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    #[zbus(property)]
    async fn product_id(&self) -> u16 {
        self.product_id
    }
}

/// Telemetry of one fan channel. Fields not reported yet read as 0.
pub struct FanInterface {
    channel: ChannelHandle,
}

impl FanInterface {
    pub fn new(channel: ChannelHandle) -> Self {
        Self { channel }
    }
}

#[interface(name = "org.liquidctl.LiquidD.Fan")]
impl FanInterface {
    #[zbus(property)]
    async fn rpm(&self) -> u16 {
        self.channel.telemetry().rpm.unwrap_or(0)
    }

    #[zbus(property)]
    async fn duty_percent(&self) -> u8 {
        self.channel.telemetry().duty_percent.unwrap_or(0)
    }

    #[zbus(property)]
    async fn fan_type(&self) -> u8 {
        self.channel.telemetry().fan_type.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        drivers::{channel::Channel, dispatcher::DriverParams, nzxt_smart2::NzxtSmart2},
        hid::{HidDevice, testing::MockIo},
    };
    use pretty_assertions::assert_eq;

    fn mock_driver(script: &[Result<usize, std::io::ErrorKind>]) -> Arc<dyn HidDriver> {
        let (io, _feed) = MockIo::new();
        for outcome in script {
            io.script_write(*outcome);
        }
        let device = HidDevice::from_io(io, "/dev/hidraw5", 64);
        Arc::new(NzxtSmart2::new(DriverParams::new(device)))
    }

    #[tokio::test]
    async fn fan_properties_default_to_zero() {
        let channel = Arc::new(Channel::new("fan1"));
        let iface = FanInterface::new(channel.clone());
        assert_eq!(iface.rpm().await, 0);
        assert_eq!(iface.duty_percent().await, 0);

        channel.update(|t| {
            t.rpm = Some(1320);
            t.duty_percent = Some(55);
            t.fan_type = Some(2);
        });
        assert_eq!(iface.rpm().await, 1320);
        assert_eq!(iface.duty_percent().await, 55);
        assert_eq!(iface.fan_type().await, 2);
    }

    #[tokio::test]
    async fn init_device_reports_failing_step() {
        let driver = mock_driver(&[Ok(64), Ok(3)]);
        let iface = DriverInterface::new(&driver);
        match iface.init_device().await {
            Err(fdo::Error::Failed(message)) => {
                assert!(message.starts_with("failed to send set update interval command"))
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn driver_properties() {
        let driver = mock_driver(&[]);
        let iface = DriverInterface::new(&driver);
        assert!(iface.init_device().await.is_ok());
        assert_eq!(iface.state().await, "idle");
        assert_eq!(iface.device_path().await, "/dev/hidraw5");
    }

    #[tokio::test]
    async fn exported_driver_does_not_keep_device_alive() {
        let driver = mock_driver(&[]);
        let iface = DriverInterface::new(&driver);
        assert_eq!(Arc::strong_count(&driver), 1);

        drop(driver);
        assert_eq!(iface.state().await, "terminated");
        assert_eq!(iface.device_path().await, "/dev/hidraw5");
        match iface.init_device().await {
            Err(fdo::Error::Failed(message)) => assert!(message.contains("released")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hid_device_ids_from_descriptor() {
        let iface = HidDeviceInterface::from(&DeviceDescriptor::new("/dev/hidraw0", 0x1e71, 0x2006));
        assert_eq!(iface.vendor_id().await, 0x1e71);
        assert_eq!(iface.product_id().await, 0x2006);
    }
}
