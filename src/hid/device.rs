//! Per-device receive session.
//!
//! The receive loop holds only a [`Weak`] reference to the session. Dropping
//! the [`HidDevice`] cancels the outstanding read, and a read that completes
//! anyway finds the session gone and returns without touching anything.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};

use log::{debug, error, warn};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

use super::{
    io::{DeviceIo, Hidraw},
    report::HidReport,
};

/// Smallest report buffer the kernel will hand out (`HID_MIN_BUFFER_SIZE`).
pub const HID_MIN_BUFFER_SIZE: usize = 64;

/// Largest report buffer the kernel will hand out (`HID_MAX_BUFFER_SIZE`).
pub const HID_MAX_BUFFER_SIZE: usize = 16384;

/// What the receive loop hands to the registered handler.
#[derive(Debug)]
pub enum DeviceEvent {
    InputReport(HidReport),
    /// Delivered at most once; the loop has stopped when this arrives.
    Error(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Receiving,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Receiving => f.write_str("receiving"),
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

type EventHandler = Box<dyn FnMut(DeviceEvent) + Send>;

struct Session {
    state: Mutex<SessionState>,
    handler: Mutex<Option<EventHandler>>,
}

impl Session {
    fn deliver(&self, event: DeviceEvent) {
        if let Some(handler) = self.handler.lock().as_mut() {
            handler(event);
        }
    }
}

/// An open HID device: async input side, sync output side.
pub struct HidDevice<Io: DeviceIo = Hidraw> {
    io: Arc<Io>,
    path: PathBuf,
    max_input_report_size: usize,
    cancel: CancellationToken,
    session: Arc<Session>,
}

impl HidDevice<Hidraw> {
    /// Opens a hidraw node read-write.
    pub fn open(path: &Path, max_input_report_size: usize) -> Result<Self, TransportError> {
        Hidraw::open(path).map(|io| Self::from_io(io, path, max_input_report_size))
    }
}

impl<Io: DeviceIo> HidDevice<Io> {
    /// Wraps an already open device. `max_input_report_size` is clamped to the
    /// kernel's HID buffer bounds.
    pub fn from_io(io: Io, path: impl Into<PathBuf>, max_input_report_size: usize) -> Self {
        Self {
            io: Arc::new(io),
            path: path.into(),
            max_input_report_size: max_input_report_size
                .clamp(HID_MIN_BUFFER_SIZE, HID_MAX_BUFFER_SIZE),
            cancel: CancellationToken::new(),
            session: Arc::new(Session {
                state: Mutex::new(SessionState::Idle),
                handler: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_input_report_size(&self) -> usize {
        self.max_input_report_size
    }

    pub fn state(&self) -> SessionState {
        *self.session.state.lock()
    }

    /// Starts the receive loop on the current runtime.
    ///
    /// Exactly one read is outstanding at a time. Every successful read is
    /// delivered to `handler` before the next one is issued; the first failed
    /// read is delivered as [`DeviceEvent::Error`] and ends the loop.
    /// Calling this on a device that is not idle does nothing.
    pub fn start_receiving<F>(&self, handler: F)
    where
        F: FnMut(DeviceEvent) + Send + 'static,
    {
        {
            let mut state = self.session.state.lock();
            if *state != SessionState::Idle {
                warn!(
                    "{}: receive loop already started (state: {})",
                    self.path.display(),
                    *state
                );
                return;
            }
            *state = SessionState::Receiving;
        }
        *self.session.handler.lock() = Some(Box::new(handler));

        tokio::spawn(receive_loop(
            self.io.clone(),
            Arc::downgrade(&self.session),
            self.cancel.clone(),
            self.path.clone(),
            self.max_input_report_size,
        ));
    }

    /// Writes one output report and returns how many bytes the kernel took.
    /// Callers compare the count with the report size to detect short writes.
    pub fn output_report(&self, buf: &[u8]) -> Result<usize, TransportError> {
        self.io
            .write_report(buf)
            .map_err(|source| TransportError::Write {
                path: self.path.clone(),
                source,
            })
    }

    /// Cancels the outstanding read and ends the receive loop, which drops
    /// its handle on the input side. Later completions are discarded.
    ///
    /// The node itself stays open for [`output_report`](Self::output_report)
    /// until the device is dropped.
    pub fn shutdown(&self) {
        *self.session.state.lock() = SessionState::Terminated;
        self.cancel.cancel();
    }
}

impl<Io: DeviceIo> Drop for HidDevice<Io> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<Io: DeviceIo> fmt::Debug for HidDevice<Io> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidDevice")
            .field("path", &self.path)
            .field("max_input_report_size", &self.max_input_report_size)
            .field("state", &self.state())
            .finish()
    }
}

async fn receive_loop<Io: DeviceIo>(
    io: Arc<Io>,
    session: Weak<Session>,
    cancel: CancellationToken,
    path: PathBuf,
    max_input_report_size: usize,
) {
    let mut buf = vec![0u8; max_input_report_size];

    loop {
        // A read that is already complete wins over cancellation so the
        // liveness check below is what decides whether it gets delivered.
        let result = tokio::select! {
            biased;
            result = io.read_report(&mut buf) => result,
            () = cancel.cancelled() => {
                debug!("{}: read cancelled", path.display());
                return;
            }
        };

        let Some(live) = session.upgrade() else {
            debug!("{}: read completed after device was released", path.display());
            return;
        };

        if *live.state.lock() != SessionState::Receiving {
            debug!("{}: read completed after shutdown", path.display());
            return;
        }

        match result {
            Ok(len) => {
                live.deliver(DeviceEvent::InputReport(HidReport::from(&buf[..len])));
            }
            Err(source) => {
                error!("{}: read failed: {source}", path.display());
                *live.state.lock() = SessionState::Terminated;
                live.deliver(DeviceEvent::Error(TransportError::Read {
                    path: path.clone(),
                    source,
                }));
                return;
            }
        }
    }
}
