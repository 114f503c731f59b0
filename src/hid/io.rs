use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::unix::fs::OpenOptionsExt,
    path::Path,
};

use async_trait::async_trait;
use tokio::io::{Interest, unix::AsyncFd};

use crate::error::TransportError;

/// Byte-level access to an open HID device.
///
/// Reads are asynchronous and must be cancel-safe: dropping the future before
/// it completes must not lose or corrupt later reads. Writes are synchronous.
#[async_trait]
pub trait DeviceIo: Send + Sync + 'static {
    async fn read_report(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_report(&self, buf: &[u8]) -> io::Result<usize>;
}

/// A `/dev/hidrawN` node opened read-write and polled through the reactor.
#[derive(Debug)]
pub struct Hidraw {
    fd: AsyncFd<File>,
}

impl Hidraw {
    /// Opens `path` non-blocking. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        let open_error = |source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)
            .map_err(open_error)?;

        let fd = AsyncFd::with_interest(file, Interest::READABLE).map_err(open_error)?;

        Ok(Self { fd })
    }
}

#[async_trait]
impl DeviceIo for Hidraw {
    async fn read_report(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    // hidraw output reports complete synchronously.
    fn write_report(&self, buf: &[u8]) -> io::Result<usize> {
        let mut file: &File = self.fd.get_ref();
        file.write(buf)
    }
}
