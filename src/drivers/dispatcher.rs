//! Generic report routing shared by all HID drivers.
//!
//! Each report is routed on its first byte. Handlers registered for that id
//! run in registration order until one reports [`Dispatch::Handled`]; if none
//! does, the default handler runs. At most one handler's side effects apply.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use log::{debug, error};
use parking_lot::RwLock;

use crate::{
    error::TransportError,
    event::{Event, EventBus},
    hid::{DeviceDescriptor, DeviceEvent, DeviceIo, HidDevice, HidReport, Hidraw},
};

use super::channel::{ChannelHandle, ChannelRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unhandled,
}

/// Decodes one kind of report.
pub trait ReportHandler: Send + Sync {
    fn handle(&self, report: &HidReport) -> Dispatch;
}

impl<F> ReportHandler for F
where
    F: Fn(&HidReport) -> Dispatch + Send + Sync,
{
    fn handle(&self, report: &HidReport) -> Dispatch {
        self(report)
    }
}

type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

#[derive(Default)]
struct Routes {
    by_id: HashMap<u8, Vec<Arc<dyn ReportHandler>>>,
    fallback: Option<Arc<dyn ReportHandler>>,
    on_error: Option<ErrorHandler>,
}

impl Routes {
    fn dispatch(routes: &RwLock<Routes>, report: &HidReport) -> Dispatch {
        // Handlers run without the lock held so they may register more.
        let (chain, fallback) = {
            let routes = routes.read();
            let chain = report
                .id()
                .and_then(|id| routes.by_id.get(&id).cloned())
                .unwrap_or_default();
            (chain, routes.fallback.clone())
        };

        if chain
            .iter()
            .any(|handler| handler.handle(report) == Dispatch::Handled)
        {
            return Dispatch::Handled;
        }

        match fallback {
            Some(handler) => handler.handle(report),
            None => {
                debug!("No handler for {report:?}");
                Dispatch::Unhandled
            }
        }
    }
}

/// Publishes session events for one device onto the event bus, if any.
#[derive(Clone)]
pub struct Notifier {
    device: PathBuf,
    events: Option<EventBus>,
}

impl Notifier {
    pub fn telemetry_updated(&self, channel: &str) {
        self.publish(Event::TelemetryUpdated {
            device: self.device.clone(),
            channel: channel.to_string(),
        });
    }

    pub fn device_error(&self, err: &TransportError) {
        self.publish(Event::DeviceError {
            device: self.device.clone(),
            message: err.to_string(),
        });
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.events {
            if let Err(e) = bus.publish(event) {
                debug!("{}: event not delivered: {e}", self.device.display());
            }
        }
    }
}

/// What a driver is built from. Only the device is required.
pub struct DriverParams<Io: DeviceIo = Hidraw> {
    pub device: HidDevice<Io>,
    pub descriptor: Option<DeviceDescriptor>,
    pub events: Option<EventBus>,
}

impl<Io: DeviceIo> DriverParams<Io> {
    pub fn new(device: HidDevice<Io>) -> Self {
        Self {
            device,
            descriptor: None,
            events: None,
        }
    }

    pub fn with_descriptor(mut self, descriptor: DeviceDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }
}

/// Owns one device, its routing table and its channels.
pub struct Dispatcher<Io: DeviceIo = Hidraw> {
    device: HidDevice<Io>,
    descriptor: Option<DeviceDescriptor>,
    events: Option<EventBus>,
    routes: Arc<RwLock<Routes>>,
    channels: ChannelRegistry,
}

impl<Io: DeviceIo> Dispatcher<Io> {
    pub fn new(params: DriverParams<Io>) -> Self {
        Self {
            device: params.device,
            descriptor: params.descriptor,
            events: params.events,
            routes: Arc::new(RwLock::new(Routes::default())),
            channels: ChannelRegistry::default(),
        }
    }

    pub fn register_handler<H>(&self, report_id: u8, handler: H)
    where
        H: ReportHandler + 'static,
    {
        self.routes
            .write()
            .by_id
            .entry(report_id)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Replaces the handler that runs when no id-specific handler claims a report.
    pub fn register_default_handler<H>(&self, handler: H)
    where
        H: ReportHandler + 'static,
    {
        self.routes.write().fallback = Some(Arc::new(handler));
    }

    /// Called once when the receive loop stops on a transport error.
    pub fn register_error_handler<F>(&self, handler: F)
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.routes.write().on_error = Some(Arc::new(handler));
    }

    /// Routes one report synchronously.
    pub fn dispatch(&self, report: &HidReport) -> Dispatch {
        Routes::dispatch(&self.routes, report)
    }

    /// Starts the device's receive loop with this dispatcher as its handler.
    pub fn start(&self) {
        let routes = self.routes.clone();
        let notifier = self.notifier();

        self.device.start_receiving(move |event| match event {
            DeviceEvent::InputReport(report) => {
                Routes::dispatch(&routes, &report);
            }
            DeviceEvent::Error(err) => {
                error!("{}: device error: {err}", notifier.device.display());
                let on_error = routes.read().on_error.clone();
                if let Some(handler) = on_error {
                    handler(&err);
                }
                notifier.device_error(&err);
            }
        });
    }

    pub fn add_channel(&mut self, name: &str) -> ChannelHandle {
        self.channels.add(name)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelHandle> {
        self.channels.get(name)
    }

    pub fn for_each_channel(&self, mut f: impl FnMut(&str, &ChannelHandle)) {
        for (name, channel) in self.channels.iter() {
            f(name, channel);
        }
    }

    pub fn device(&self) -> &HidDevice<Io> {
        &self.device
    }

    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn notifier(&self) -> Notifier {
        Notifier {
            device: self.device.path().to_path_buf(),
            events: self.events.clone(),
        }
    }
}
