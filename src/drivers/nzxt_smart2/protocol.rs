//! Report layouts for NZXT Smart Device V2 class controllers.
//!
//! All reports share a 24 byte prefix:
//! `[id][magic or type][14 reserved][fan type x 8]`. Multi-byte fields are
//! little-endian. Output reports are fixed 64 byte buffers, zero padded.

use crate::error::{InitStep, ProtocolError};

pub const OUTPUT_REPORT_SIZE: usize = 64;

/// Channels modelled and exported per controller.
pub const FAN_CHANNELS: usize = 3;
/// Fan slots present in every report.
pub const FAN_CHANNELS_MAX: usize = 8;

pub const INPUT_REPORT_ID_FAN_CONFIG: u8 = 0x61;
pub const INPUT_REPORT_ID_FAN_STATUS: u8 = 0x67;

const OUTPUT_REPORT_ID_INIT_COMMAND: u8 = 0x60;
const INIT_COMMAND_SET_UPDATE_INTERVAL: u8 = 0x02;
const INIT_COMMAND_DETECT_FANS: u8 = 0x03;

const FAN_CONFIG_MAGIC: u8 = 0x03;
const FAN_STATUS_REPORT_SPEED: u8 = 0x02;
const FAN_STATUS_REPORT_VOLTAGE: u8 = 0x04;

const FAN_TYPE_OFFSET: usize = 2 + 14;
const PAYLOAD_OFFSET: usize = FAN_TYPE_OFFSET + FAN_CHANNELS_MAX;

// rpm (u16 x 8), duty (u8 x 8), duplicate duty (u8 x 8), noise (u8)
const SPEED_PAYLOAD_LEN: usize = 2 * FAN_CHANNELS_MAX + 2 * FAN_CHANNELS_MAX + 1;
// millivolts (u16 x 8), milliamps (u16 x 8)
const VOLTAGE_PAYLOAD_LEN: usize = 2 * FAN_CHANNELS_MAX + 2 * FAN_CHANNELS_MAX;

pub const FAN_CONFIG_REPORT_LEN: usize = PAYLOAD_OFFSET;
pub const FAN_STATUS_REPORT_LEN: usize = PAYLOAD_OFFSET
    + if SPEED_PAYLOAD_LEN > VOLTAGE_PAYLOAD_LEN {
        SPEED_PAYLOAD_LEN
    } else {
        VOLTAGE_PAYLOAD_LEN
    };

/// Fan config input report (`0x61`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanConfigReport {
    pub fan_type: [u8; FAN_CHANNELS_MAX],
}

impl FanConfigReport {
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        check_len("fan config", buf, FAN_CONFIG_REPORT_LEN)?;

        let magic = buf[1];
        if magic != FAN_CONFIG_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        Ok(Self {
            fan_type: fan_types(buf),
        })
    }
}

/// Payload of a fan status report, selected by the type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanStatus {
    Speed {
        rpm: [u16; FAN_CHANNELS_MAX],
        duty_percent: [u8; FAN_CHANNELS_MAX],
    },
    Voltage {
        millivolts: [u16; FAN_CHANNELS_MAX],
        milliamps: [u16; FAN_CHANNELS_MAX],
    },
}

/// Fan status input report (`0x67`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanStatusReport {
    pub fan_type: [u8; FAN_CHANNELS_MAX],
    pub status: FanStatus,
}

impl FanStatusReport {
    /// Both payload kinds are checked against the full report size.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        check_len("fan status", buf, FAN_STATUS_REPORT_LEN)?;

        let payload = &buf[PAYLOAD_OFFSET..];
        let status = match buf[1] {
            FAN_STATUS_REPORT_SPEED => FanStatus::Speed {
                rpm: le_u16s(payload),
                duty_percent: bytes(&payload[2 * FAN_CHANNELS_MAX..]),
            },
            FAN_STATUS_REPORT_VOLTAGE => FanStatus::Voltage {
                millivolts: le_u16s(payload),
                milliamps: le_u16s(&payload[2 * FAN_CHANNELS_MAX..]),
            },
            other => return Err(ProtocolError::UnknownStatusType(other)),
        };

        Ok(Self {
            fan_type: fan_types(buf),
            status,
        })
    }
}

/// Output commands sent by `init_device`, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitCommand {
    DetectFans,
    SetUpdateInterval,
}

impl InitCommand {
    pub const SEQUENCE: [InitCommand; 2] = [InitCommand::DetectFans, InitCommand::SetUpdateInterval];

    pub fn to_bytes(self) -> [u8; OUTPUT_REPORT_SIZE] {
        let body: &[u8] = match self {
            InitCommand::DetectFans => &[OUTPUT_REPORT_ID_INIT_COMMAND, INIT_COMMAND_DETECT_FANS],
            // 0x03e8 = 1000 ms, once per update group
            InitCommand::SetUpdateInterval => &[
                OUTPUT_REPORT_ID_INIT_COMMAND,
                INIT_COMMAND_SET_UPDATE_INTERVAL,
                0x01,
                0xe8,
                0x03,
                0x01,
                0xe8,
                0x03,
            ],
        };

        let mut buf = [0u8; OUTPUT_REPORT_SIZE];
        buf[..body.len()].copy_from_slice(body);
        buf
    }

    pub fn step(self) -> InitStep {
        match self {
            InitCommand::DetectFans => InitStep::DetectFans,
            InitCommand::SetUpdateInterval => InitStep::SetUpdateInterval,
        }
    }
}

fn check_len(report: &'static str, buf: &[u8], min: usize) -> Result<(), ProtocolError> {
    if buf.len() < min {
        return Err(ProtocolError::TooShort {
            report,
            len: buf.len(),
            min,
        });
    }
    Ok(())
}

fn fan_types(buf: &[u8]) -> [u8; FAN_CHANNELS_MAX] {
    bytes(&buf[FAN_TYPE_OFFSET..])
}

fn bytes(buf: &[u8]) -> [u8; FAN_CHANNELS_MAX] {
    std::array::from_fn(|i| buf[i])
}

fn le_u16s(buf: &[u8]) -> [u16; FAN_CHANNELS_MAX] {
    std::array::from_fn(|i| u16::from_le_bytes([buf[2 * i], buf[2 * i + 1]]))
}
