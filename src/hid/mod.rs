//! Raw HID transport: report buffers, device I/O, the receive loop and
//! one-shot device enumeration.

pub mod device;
pub mod discovery;
pub mod io;
pub mod report;

pub use device::{DeviceEvent, HID_MAX_BUFFER_SIZE, HID_MIN_BUFFER_SIZE, HidDevice, SessionState};
pub use discovery::{DeviceCatalog, DeviceDescriptor, HidapiCatalog};
pub use io::{DeviceIo, Hidraw};
pub use report::HidReport;

#[cfg(test)]
pub(crate) mod testing;
