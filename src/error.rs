//! Error taxonomy for the HID core.
//!
//! Transport failures are fatal to a device session, protocol failures are
//! recovered inside the decoder, and init failures are returned to the caller
//! of `init_device` without touching the receive session.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Failure talking to the device file.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("short write to {}: {written} of {expected} bytes", path.display())]
    ShortWrite {
        path: PathBuf,
        written: usize,
        expected: usize,
    },
}

impl TransportError {
    /// OS error number behind this failure, if there is one.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Open { source, .. } | Self::Read { source, .. } | Self::Write { source, .. } => {
                source.raw_os_error()
            }
            Self::ShortWrite { .. } => None,
        }
    }
}

/// Malformed or unrecognized report content.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{report} report too short: {len} bytes, need {min}")]
    TooShort {
        report: &'static str,
        len: usize,
        min: usize,
    },

    #[error("fan config report: invalid magic {0:#04x}")]
    BadMagic(u8),

    #[error("unknown fan status report type {0:#04x}")]
    UnknownStatusType(u8),

    #[error("unhandled input report {0:#04x}")]
    UnknownReport(u8),

    #[error("empty input report")]
    Empty,
}

/// Which of the initialization commands was being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    DetectFans,
    SetUpdateInterval,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DetectFans => f.write_str("detect fans"),
            Self::SetUpdateInterval => f.write_str("set update interval"),
        }
    }
}

/// An `init_device` write did not complete.
#[derive(Debug, Error)]
#[error("failed to send {step} command: {source}")]
pub struct InitError {
    pub step: InitStep,
    #[source]
    pub source: TransportError,
}
