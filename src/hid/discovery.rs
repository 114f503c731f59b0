//! One-shot enumeration of present HID devices.

use std::{collections::BTreeMap, fmt, path::PathBuf};

use anyhow::{Context, Result};
use hidapi::{BusType, HidApi};
use log::{debug, info};

/// A device present at startup: where it lives and what it claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub path: PathBuf,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceDescriptor {
    pub fn new(path: impl Into<PathBuf>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            path: path.into(),
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vendor={:#06x} product={:#06x}: {}",
            self.vendor_id,
            self.product_id,
            self.path.display()
        )
    }
}

/// Source of the device list used at startup.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceCatalog {
    fn devices(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// Enumerates USB hidraw nodes through hidapi.
pub struct HidapiCatalog {
    api: HidApi,
}

impl HidapiCatalog {
    pub fn new() -> Result<Self> {
        Ok(Self {
            api: HidApi::new().context("hidapi init")?,
        })
    }
}

impl DeviceCatalog for HidapiCatalog {
    fn devices(&self) -> Result<Vec<DeviceDescriptor>> {
        // One entry per node; hidapi lists a device once per usage.
        let devices: BTreeMap<PathBuf, DeviceDescriptor> = self
            .api
            .device_list()
            .filter(|d| matches!(d.bus_type(), BusType::Usb))
            .filter_map(|d| {
                let path = d.path().to_str().ok().map(PathBuf::from);
                if path.is_none() {
                    debug!("skipping HID device with non UTF-8 path: {:?}", d.path());
                }
                path.map(|path| {
                    (
                        path.clone(),
                        DeviceDescriptor::new(path, d.vendor_id(), d.product_id()),
                    )
                })
            })
            .collect();

        info!("Found {} USB HID device(s)", devices.len());
        Ok(devices.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn descriptor_display_matches_log_format() {
        let d = DeviceDescriptor::new("/dev/hidraw3", 0x1e71, 0x2006);
        assert_eq!(d.to_string(), "vendor=0x1e71 product=0x2006: /dev/hidraw3");
    }

    #[test]
    fn mock_catalog_yields_descriptors() {
        let mut catalog = MockDeviceCatalog::new();
        catalog
            .expect_devices()
            .times(1)
            .returning(|| Ok(vec![DeviceDescriptor::new("/dev/hidraw0", 1, 2)]));

        let devices = catalog.devices().unwrap();
        assert_eq!(devices, vec![DeviceDescriptor::new("/dev/hidraw0", 1, 2)]);
    }
}
