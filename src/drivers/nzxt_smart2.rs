//! NZXT Smart Device V2 class fan controllers (Smart Device V2, RGB & Fan
//! Controller and H-series integrated controllers).

pub mod protocol;

use std::{path::Path, sync::Arc};

use log::{debug, info, warn};

use crate::{
    error::{InitError, ProtocolError, TransportError},
    hid::{DeviceDescriptor, DeviceIo, HidReport, Hidraw, SessionState},
};

use self::protocol::{
    FAN_CHANNELS, FanConfigReport, FanStatus, FanStatusReport, INPUT_REPORT_ID_FAN_CONFIG,
    INPUT_REPORT_ID_FAN_STATUS, InitCommand, OUTPUT_REPORT_SIZE,
};

use super::{
    HidDriver,
    channel::ChannelHandle,
    dispatcher::{Dispatch, Dispatcher, DriverParams, Notifier},
};

/// NZXT vendor ID.
pub const VENDOR_ID: u16 = 0x1e71;

/// Products sharing the Smart Device V2 report layout.
pub const PRODUCT_IDS: [u16; 5] = [0x2006, 0x200d, 0x2009, 0x200e, 0x2010];

pub const TYPE_NAME: &str = "NzxtSmart2";

/// Exact vendor and product match.
pub fn matches(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == VENDOR_ID && PRODUCT_IDS.contains(&product_id)
}

/// Decoder for one controller. Owns its dispatcher and through it the device.
pub struct NzxtSmart2<Io: DeviceIo = Hidraw> {
    dispatcher: Dispatcher<Io>,
}

/// Where decoded values go. Shared by every registered handler.
struct FanSink {
    fans: [ChannelHandle; FAN_CHANNELS],
    notifier: Notifier,
    label: String,
}

impl<Io: DeviceIo> NzxtSmart2<Io> {
    pub fn new(params: DriverParams<Io>) -> Self {
        let mut dispatcher = Dispatcher::new(params);
        let fans = std::array::from_fn(|i| dispatcher.add_channel(&format!("fan{}", i + 1)));
        let sink = Arc::new(FanSink {
            fans,
            notifier: dispatcher.notifier(),
            label: format!("{TYPE_NAME} {}", dispatcher.device().path().display()),
        });

        let config = sink.clone();
        dispatcher.register_handler(INPUT_REPORT_ID_FAN_CONFIG, move |report: &HidReport| {
            config.fan_config(report)
        });

        let status = sink.clone();
        dispatcher.register_handler(INPUT_REPORT_ID_FAN_STATUS, move |report: &HidReport| {
            status.fan_status(report)
        });

        let fallback = sink.clone();
        dispatcher.register_default_handler(move |report: &HidReport| fallback.unknown(report));

        dispatcher.register_error_handler(move |err: &TransportError| {
            warn!("{}: receive session ended: {err}", sink.label);
        });

        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher<Io> {
        &self.dispatcher
    }

    pub fn fan(&self, idx: usize) -> Option<&ChannelHandle> {
        self.dispatcher.channel(&format!("fan{}", idx + 1))
    }

    /// Sends "detect fans" then "set update interval". Stops at the first
    /// write that fails or does not take the whole report.
    pub fn init_device(&self) -> Result<(), InitError> {
        let device = self.dispatcher.device();

        for command in InitCommand::SEQUENCE {
            let step = command.step();
            let written = device
                .output_report(&command.to_bytes())
                .map_err(|source| InitError { step, source })?;

            if written != OUTPUT_REPORT_SIZE {
                return Err(InitError {
                    step,
                    source: TransportError::ShortWrite {
                        path: device.path().to_path_buf(),
                        written,
                        expected: OUTPUT_REPORT_SIZE,
                    },
                });
            }
            debug!("{}: sent {step} command", device.path().display());
        }

        info!("{}: initialized", device.path().display());
        Ok(())
    }
}

impl<Io: DeviceIo> HidDriver for NzxtSmart2<Io> {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn device_path(&self) -> &Path {
        self.dispatcher.device().path()
    }

    fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.dispatcher.descriptor()
    }

    fn state(&self) -> SessionState {
        self.dispatcher.device().state()
    }

    fn start(&self) {
        self.dispatcher.start();
    }

    fn for_each_channel(&self, f: &mut dyn FnMut(&str, &ChannelHandle)) {
        self.dispatcher.for_each_channel(f);
    }

    fn init_device(&self) -> Result<(), InitError> {
        NzxtSmart2::init_device(self)
    }
}

impl FanSink {
    fn fan_config(&self, report: &HidReport) -> Dispatch {
        match FanConfigReport::parse(report.as_bytes()) {
            Ok(parsed) => {
                for (fan, fan_type) in self.fans.iter().zip(parsed.fan_type) {
                    fan.update(|t| t.fan_type = Some(fan_type));
                    self.notifier.telemetry_updated(fan.name());
                }
                debug!("{}: fan types {:?}", self.label, &parsed.fan_type[..FAN_CHANNELS]);
            }
            Err(e) => self.discard(e),
        }
        Dispatch::Handled
    }

    fn fan_status(&self, report: &HidReport) -> Dispatch {
        let parsed = match FanStatusReport::parse(report.as_bytes()) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.discard(e);
                return Dispatch::Handled;
            }
        };

        match parsed.status {
            FanStatus::Speed { rpm, duty_percent } => {
                for (i, fan) in self.fans.iter().enumerate() {
                    fan.update(|t| {
                        t.fan_type = Some(parsed.fan_type[i]);
                        t.rpm = Some(rpm[i]);
                        t.duty_percent = Some(duty_percent[i]);
                    });
                    self.notifier.telemetry_updated(fan.name());
                }
                debug!(
                    "{}: rpm {:?} duty {:?}",
                    self.label,
                    &rpm[..FAN_CHANNELS],
                    &duty_percent[..FAN_CHANNELS]
                );
            }
            // Observed only, not exported.
            FanStatus::Voltage {
                millivolts,
                milliamps,
            } => {
                debug!(
                    "{}: mV {:?} mA {:?}",
                    self.label,
                    &millivolts[..FAN_CHANNELS],
                    &milliamps[..FAN_CHANNELS]
                );
            }
        }
        Dispatch::Handled
    }

    fn unknown(&self, report: &HidReport) -> Dispatch {
        match report.id() {
            Some(id) => warn!("{}: {}", self.label, ProtocolError::UnknownReport(id)),
            None => debug!("{}: {}", self.label, ProtocolError::Empty),
        }
        Dispatch::Handled
    }

    fn discard(&self, err: ProtocolError) {
        warn!("{}: discarding report: {err}", self.label);
    }
}
