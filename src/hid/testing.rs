//! In-memory [`DeviceIo`] for exercising the receive loop and drivers.

use std::{collections::VecDeque, io, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::io::DeviceIo;

type ReadResult = io::Result<Vec<u8>>;

/// Reads block until the paired [`MockFeed`] supplies a result; writes are
/// recorded and answered from a script, defaulting to "everything written".
pub struct MockIo {
    reads: tokio::sync::Mutex<mpsc::UnboundedReceiver<ReadResult>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    write_script: Mutex<VecDeque<Result<usize, io::ErrorKind>>>,
}

pub struct MockFeed(mpsc::UnboundedSender<ReadResult>);

impl MockIo {
    pub fn new() -> (Self, MockFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                reads: tokio::sync::Mutex::new(rx),
                writes: Arc::new(Mutex::new(Vec::new())),
                write_script: Mutex::new(VecDeque::new()),
            },
            MockFeed(tx),
        )
    }

    /// Every buffer passed to `write_report`, in order.
    pub fn writes(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.writes.clone()
    }

    /// Queues the outcome of the next unscripted write.
    pub fn script_write(&self, outcome: Result<usize, io::ErrorKind>) {
        self.write_script.lock().push_back(outcome);
    }
}

impl MockFeed {
    pub fn send_report(&self, bytes: &[u8]) {
        let _ = self.0.send(Ok(bytes.to_vec()));
    }

    pub fn send_error(&self, kind: io::ErrorKind) {
        let _ = self.0.send(Err(io::Error::from(kind)));
    }

    /// True once the device side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

#[async_trait]
impl DeviceIo for MockIo {
    async fn read_report(&self, buf: &mut [u8]) -> io::Result<usize> {
        let next = self.reads.lock().await.recv().await;
        match next {
            Some(Ok(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            Some(Err(e)) => Err(e),
            None => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
        }
    }

    fn write_report(&self, buf: &[u8]) -> io::Result<usize> {
        self.writes.lock().push(buf.to_vec());
        match self.write_script.lock().pop_front() {
            Some(Ok(n)) => Ok(n),
            Some(Err(kind)) => Err(io::Error::from(kind)),
            None => Ok(buf.len()),
        }
    }
}
