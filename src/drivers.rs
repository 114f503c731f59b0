//! Device drivers built on the generic report [`Dispatcher`](dispatcher::Dispatcher).

pub mod channel;
pub mod dispatcher;
pub mod nzxt_smart2;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use log::{debug, error, info};

use crate::{
    error::InitError,
    event::EventBus,
    hid::{DeviceCatalog, DeviceDescriptor, HidDevice, SessionState},
};

use self::{channel::ChannelHandle, dispatcher::DriverParams};

/// What the export and lifecycle layers need from a concrete driver.
pub trait HidDriver: Send + Sync {
    /// Stable name used as the export path component.
    fn type_name(&self) -> &'static str;

    fn device_path(&self) -> &Path;

    fn descriptor(&self) -> Option<&DeviceDescriptor>;

    fn state(&self) -> SessionState;

    /// Starts the device's receive session.
    fn start(&self);

    fn for_each_channel(&self, f: &mut dyn FnMut(&str, &ChannelHandle));

    fn init_device(&self) -> Result<(), InitError>;
}

struct DriverEntry {
    type_name: &'static str,
    matches: fn(u16, u16) -> bool,
    build: fn(DriverParams) -> Arc<dyn HidDriver>,
}

const DRIVERS: &[DriverEntry] = &[DriverEntry {
    type_name: nzxt_smart2::TYPE_NAME,
    matches: nzxt_smart2::matches,
    build: |params| Arc::new(nzxt_smart2::NzxtSmart2::new(params)) as Arc<dyn HidDriver>,
}];

fn driver_for(descriptor: &DeviceDescriptor) -> Option<&'static DriverEntry> {
    DRIVERS
        .iter()
        .find(|entry| (entry.matches)(descriptor.vendor_id, descriptor.product_id))
}

/// Opens every cataloged device a driver claims. Devices that fail to open
/// are logged and skipped.
pub fn probe_all(
    catalog: &dyn DeviceCatalog,
    max_report_size: usize,
    events: &EventBus,
) -> Result<Vec<Arc<dyn HidDriver>>> {
    let descriptors = catalog.devices().context("device enumeration")?;

    let drivers: Vec<_> = descriptors
        .into_iter()
        .inspect(|d| debug!("{d}"))
        .filter_map(|d| driver_for(&d).map(|entry| (entry, d)))
        .filter_map(|(entry, d)| {
            info!("{}: {d}", entry.type_name);
            match HidDevice::open(&d.path, max_report_size) {
                Ok(device) => Some((entry.build)(
                    DriverParams::new(device)
                        .with_descriptor(d)
                        .with_events(events.clone()),
                )),
                Err(e) => {
                    error!("{}: {e}", entry.type_name);
                    None
                }
            }
        })
        .collect();

    info!("{} driver(s) bound", drivers.len());
    Ok(drivers)
}
