use std::{collections::BTreeMap, sync::Arc};

use log::debug;
use parking_lot::RwLock;

/// Most recent values reported for one channel. `None` until the device has
/// reported the field at least once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelTelemetry {
    pub fan_type: Option<u8>,
    pub rpm: Option<u16>,
    pub duty_percent: Option<u8>,
}

/// A named logical sub-device, e.g. one physical fan header.
#[derive(Debug)]
pub struct Channel {
    name: String,
    telemetry: RwLock<ChannelTelemetry>,
}

pub type ChannelHandle = Arc<Channel>;

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            telemetry: RwLock::new(ChannelTelemetry::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn telemetry(&self) -> ChannelTelemetry {
        *self.telemetry.read()
    }

    pub fn update(&self, f: impl FnOnce(&mut ChannelTelemetry)) {
        f(&mut *self.telemetry.write());
    }
}

/// Channels owned by one driver, keyed by name.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, ChannelHandle>,
}

impl ChannelRegistry {
    /// Inserts a fresh channel. An existing channel with the same name is
    /// replaced and no longer reachable through the registry.
    pub fn add(&mut self, name: &str) -> ChannelHandle {
        let channel = Arc::new(Channel::new(name));
        if self.channels.insert(name.to_string(), channel.clone()).is_some() {
            debug!("Channel '{name}' replaced");
        }
        channel
    }

    pub fn get(&self, name: &str) -> Option<&ChannelHandle> {
        self.channels.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelHandle)> {
        self.channels.iter().map(|(name, ch)| (name.as_str(), ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_name_keeps_the_second_channel() {
        let mut registry = ChannelRegistry::default();
        let first = registry.add("fan0");
        let second = registry.add("fan0");

        assert_eq!(registry.iter().count(), 1);
        let reachable = registry.get("fan0").unwrap();
        assert!(Arc::ptr_eq(reachable, &second));
        assert!(!Arc::ptr_eq(reachable, &first));
    }

    #[test]
    fn update_mutates_in_place() {
        let mut registry = ChannelRegistry::default();
        let fan = registry.add("fan1");
        fan.update(|t| t.rpm = Some(900));

        assert_eq!(registry.get("fan1").unwrap().telemetry().rpm, Some(900));
        assert_eq!(fan.telemetry().duty_percent, None);
    }

    #[test]
    fn iter_visits_every_channel_once() {
        let mut registry = ChannelRegistry::default();
        for name in ["fan2", "fan1", "fan3"] {
            registry.add(name);
        }

        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["fan1", "fan2", "fan3"]);
    }
}
