//! The configured device list.

use serde::Serialize;

use crate::config::DeviceConfig;

/// Registered devices and their locations.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceConfig>,
}

/// A device as listed by the API and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub id: String,
    pub location: Option<String>,
}

impl From<&DeviceConfig> for DeviceEntry {
    fn from(device: &DeviceConfig) -> Self {
        Self {
            id: device.id.clone(),
            location: device.location.clone(),
        }
    }
}

impl DeviceRegistry {
    pub fn new(devices: Vec<DeviceConfig>) -> Self {
        Self { devices }
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Registered devices, in configuration order.
    pub fn entries(&self) -> Vec<DeviceEntry> {
        self.devices.iter().map(DeviceEntry::from).collect()
    }

    pub fn get(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// The device at `location` (case-insensitive).
    pub fn by_location(&self, location: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| {
            d.location
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(location))
        })
    }
}
