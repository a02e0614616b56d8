//! Audio device data models.
//!
//! Defines the logical devices exposed to callers, the raw endpoint types
//! reported by the platform, routing state and the error taxonomy.

use crate::platform::PlatformError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFlow {
    /// Playback endpoints (speaker, headset, bluetooth headphones)
    Output,

    /// Capture endpoints (microphones)
    Input,
}

impl fmt::Display for DeviceFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFlow::Output => f.write_str("output"),
            DeviceFlow::Input => f.write_str("input"),
        }
    }
}

/// A named category of audio endpoint.
///
/// Several physical endpoints may collapse into one logical device (wired
/// headphones and a wired headset are both `Headset`). Identity is the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalDevice {
    Speaker,
    Headset,
    Bluetooth,
    BuiltInMic,
    HeadsetMic,
    BluetoothMic,
}

impl LogicalDevice {
    /// All logical devices, outputs first.
    pub const ALL: [LogicalDevice; 6] = [
        LogicalDevice::Speaker,
        LogicalDevice::Headset,
        LogicalDevice::Bluetooth,
        LogicalDevice::BuiltInMic,
        LogicalDevice::HeadsetMic,
        LogicalDevice::BluetoothMic,
    ];

    /// Label shown to the user and used across the bridge.
    pub fn label(&self) -> &'static str {
        match self {
            LogicalDevice::Speaker => "Speaker",
            LogicalDevice::Headset => "Headset",
            LogicalDevice::Bluetooth => "Bluetooth",
            LogicalDevice::BuiltInMic => "Built-in Microphone",
            LogicalDevice::HeadsetMic => "Headset Microphone",
            LogicalDevice::BluetoothMic => "Bluetooth Microphone",
        }
    }

    pub fn flow(&self) -> DeviceFlow {
        match self {
            LogicalDevice::Speaker | LogicalDevice::Headset | LogicalDevice::Bluetooth => {
                DeviceFlow::Output
            }
            LogicalDevice::BuiltInMic | LogicalDevice::HeadsetMic | LogicalDevice::BluetoothMic => {
                DeviceFlow::Input
            }
        }
    }

    /// Parse a label, keeping it only if it belongs to `flow`.
    pub fn parse_for(label: &str, flow: DeviceFlow) -> Option<Self> {
        label.parse::<Self>().ok().filter(|d| d.flow() == flow)
    }
}

impl fmt::Display for LogicalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LogicalDevice {
    type Err = UnknownDevice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalDevice::ALL
            .iter()
            .copied()
            .find(|d| d.label() == s)
            .ok_or_else(|| UnknownDevice(s.to_string()))
    }
}

impl Serialize for LogicalDevice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Label that does not name any logical device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown audio device: {0}")]
pub struct UnknownDevice(pub String);

/// Raw hardware endpoint type as reported by the platform.
///
/// Codes follow `android.media.AudioDeviceInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointType {
    BuiltinEarpiece,
    BuiltinSpeaker,
    WiredHeadset,
    WiredHeadphones,
    BluetoothSco,
    BluetoothA2dp,
    BuiltinMic,
    Other(i32),
}

impl EndpointType {
    pub fn from_raw(code: i32) -> Self {
        match code {
            1 => EndpointType::BuiltinEarpiece,
            2 => EndpointType::BuiltinSpeaker,
            3 => EndpointType::WiredHeadset,
            4 => EndpointType::WiredHeadphones,
            7 => EndpointType::BluetoothSco,
            8 => EndpointType::BluetoothA2dp,
            15 => EndpointType::BuiltinMic,
            other => EndpointType::Other(other),
        }
    }

    pub fn raw(&self) -> i32 {
        match self {
            EndpointType::BuiltinEarpiece => 1,
            EndpointType::BuiltinSpeaker => 2,
            EndpointType::WiredHeadset => 3,
            EndpointType::WiredHeadphones => 4,
            EndpointType::BluetoothSco => 7,
            EndpointType::BluetoothA2dp => 8,
            EndpointType::BuiltinMic => 15,
            EndpointType::Other(code) => *code,
        }
    }
}

/// Currently selected output and input devices.
///
/// The two halves are independent: selecting an output never touches the
/// input selection and vice versa.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingState {
    pub output: Option<LogicalDevice>,
    pub input: Option<LogicalDevice>,
}

impl RoutingState {
    pub fn selected(&self, flow: DeviceFlow) -> Option<LogicalDevice> {
        match flow {
            DeviceFlow::Output => self.output,
            DeviceFlow::Input => self.input,
        }
    }
}

/// Which stream a volume operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeAction {
    GetSystem,
    SetSystem,
    SetMicrophone,
}

impl fmt::Display for VolumeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeAction::GetSystem => f.write_str("get system volume"),
            VolumeAction::SetSystem => f.write_str("set system volume"),
            VolumeAction::SetMicrophone => f.write_str("set microphone volume"),
        }
    }
}

/// Audio service error types.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("Failed to enumerate {flow} devices: {source}")]
    DeviceEnumeration {
        flow: DeviceFlow,
        #[source]
        source: PlatformError,
    },

    #[error("Failed to select {flow} device {device}: {source}")]
    DeviceSelection {
        flow: DeviceFlow,
        device: String,
        #[source]
        source: PlatformError,
    },

    #[error("Failed to {action}: {source}")]
    Volume {
        action: VolumeAction,
        #[source]
        source: PlatformError,
    },

    #[error("Microphone permission is required")]
    PermissionDenied,

    #[error("Failed to initialize audio capture: {0}")]
    RecordingInit(#[source] PlatformError),
}

impl AudioError {
    /// Stable error code reported across the bridge.
    pub fn code(&self) -> &'static str {
        match self {
            AudioError::DeviceEnumeration { flow: DeviceFlow::Output, .. } => {
                "ERROR_FETCHING_DEVICES"
            }
            AudioError::DeviceEnumeration { flow: DeviceFlow::Input, .. } => {
                "ERROR_FETCHING_MIC_DEVICES"
            }
            AudioError::DeviceSelection { flow: DeviceFlow::Output, .. } => {
                "ERROR_SELECTING_DEVICE"
            }
            AudioError::DeviceSelection { flow: DeviceFlow::Input, .. } => "ERROR_SELECTING_MIC",
            AudioError::Volume { action: VolumeAction::GetSystem, .. } => "ERROR_GETTING_VOLUME",
            AudioError::Volume { action: VolumeAction::SetSystem, .. } => "ERROR_SETTING_VOLUME",
            AudioError::Volume { action: VolumeAction::SetMicrophone, .. } => {
                "ERROR_SETTING_MIC_VOLUME"
            }
            AudioError::PermissionDenied => "PERMISSION_DENIED",
            AudioError::RecordingInit(_) => "ERROR_STARTING_MIC_TEST",
        }
    }
}
