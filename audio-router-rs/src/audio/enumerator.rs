//! Device enumeration.
//!
//! Collapses the raw endpoint list into logical devices in a fixed priority
//! order: Bluetooth, then wired headset, then the built-in endpoint.

use super::device::{AudioError, DeviceFlow, EndpointType, LogicalDevice};
use crate::platform::AudioPlatform;
use std::sync::Arc;
use tracing::{debug, error};

/// Which logical categories are present among the raw endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Presence {
    pub bluetooth: bool,
    pub headset: bool,
    pub builtin: bool,
}

impl Presence {
    /// Scan raw endpoint types once and set a flag per category.
    pub fn scan(flow: DeviceFlow, endpoints: &[EndpointType]) -> Self {
        let mut presence = Presence::default();
        for endpoint in endpoints {
            match (flow, endpoint) {
                (DeviceFlow::Output, EndpointType::BuiltinSpeaker) => presence.builtin = true,
                (
                    DeviceFlow::Output,
                    EndpointType::WiredHeadphones | EndpointType::WiredHeadset,
                ) => presence.headset = true,
                (
                    DeviceFlow::Output,
                    EndpointType::BluetoothA2dp | EndpointType::BluetoothSco,
                ) => presence.bluetooth = true,
                (DeviceFlow::Input, EndpointType::BuiltinMic) => presence.builtin = true,
                (DeviceFlow::Input, EndpointType::WiredHeadset) => presence.headset = true,
                (DeviceFlow::Input, EndpointType::BluetoothSco) => presence.bluetooth = true,
                _ => {}
            }
        }
        presence
    }

    /// Logical devices for the present categories, highest priority first.
    pub fn to_catalog(self, flow: DeviceFlow) -> Vec<LogicalDevice> {
        let ranked = match flow {
            DeviceFlow::Output => [
                (self.bluetooth, LogicalDevice::Bluetooth),
                (self.headset, LogicalDevice::Headset),
                (self.builtin, LogicalDevice::Speaker),
            ],
            DeviceFlow::Input => [
                (self.bluetooth, LogicalDevice::BluetoothMic),
                (self.headset, LogicalDevice::HeadsetMic),
                (self.builtin, LogicalDevice::BuiltInMic),
            ],
        };

        ranked
            .into_iter()
            .filter_map(|(present, device)| present.then_some(device))
            .collect()
    }
}

/// Device enumerator backed by the platform's endpoint list.
pub struct DeviceEnumerator {
    platform: Arc<dyn AudioPlatform>,
}

impl DeviceEnumerator {
    pub fn new(platform: Arc<dyn AudioPlatform>) -> Self {
        Self { platform }
    }

    /// Output devices in priority order (Bluetooth, Headset, Speaker).
    pub fn enumerate_outputs(&self) -> Result<Vec<LogicalDevice>, AudioError> {
        self.enumerate(DeviceFlow::Output)
    }

    /// Input devices in priority order (Bluetooth, Headset, Built-in).
    pub fn enumerate_inputs(&self) -> Result<Vec<LogicalDevice>, AudioError> {
        self.enumerate(DeviceFlow::Input)
    }

    /// Build a fresh catalog for `flow`.
    pub fn enumerate(&self, flow: DeviceFlow) -> Result<Vec<LogicalDevice>, AudioError> {
        let endpoints = self.platform.endpoint_types(flow).map_err(|source| {
            error!(%flow, %source, "Endpoint enumeration failed");
            AudioError::DeviceEnumeration { flow, source }
        })?;

        let catalog = Presence::scan(flow, &endpoints).to_catalog(flow);
        debug!(%flow, raw = endpoints.len(), ?catalog, "Enumerated devices");
        Ok(catalog)
    }
}
