//! Routing policy.
//!
//! Maps a logical device to the system routing flags that send audio to it.
//! Output selection always resets to a neutral baseline before the target's
//! flags are merged in, so no flag from a previous selection survives.

use super::device::{AudioError, DeviceFlow, LogicalDevice};
use crate::platform::{AudioMode, AudioPlatform, PlatformError, WiredRouteOverride};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Set of routing switches written to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingFlags {
    pub mode: AudioMode,
    pub speakerphone: bool,

    /// Start SCO and mark it on (off means stopped and marked off)
    pub bluetooth_sco: bool,

    pub bluetooth_a2dp: bool,

    /// Requested wired headset availability, `None` leaves it alone
    pub wired_headset: Option<bool>,
}

impl RoutingFlags {
    /// Neutral state every output selection starts from.
    pub const BASELINE: RoutingFlags = RoutingFlags {
        mode: AudioMode::Normal,
        speakerphone: false,
        bluetooth_sco: false,
        bluetooth_a2dp: false,
        wired_headset: None,
    };

    /// Flags for an output target. Unknown targets only revert to normal mode.
    pub fn for_output(device: Option<LogicalDevice>) -> Self {
        match device {
            Some(LogicalDevice::Speaker) => RoutingFlags {
                mode: AudioMode::InCommunication,
                speakerphone: true,
                wired_headset: Some(false),
                ..Self::BASELINE
            },
            Some(LogicalDevice::Headset) => RoutingFlags {
                mode: AudioMode::InCommunication,
                wired_headset: Some(true),
                ..Self::BASELINE
            },
            Some(LogicalDevice::Bluetooth) => RoutingFlags {
                mode: AudioMode::InCommunication,
                bluetooth_sco: true,
                ..Self::BASELINE
            },
            _ => Self::BASELINE,
        }
    }

    /// Flags for an input target; unknown targets write nothing.
    ///
    /// Only `mode` and `bluetooth_sco` are written for inputs.
    pub fn for_input(device: Option<LogicalDevice>) -> Option<Self> {
        let (mode, bluetooth_sco) = match device? {
            LogicalDevice::BluetoothMic => (AudioMode::InCommunication, true),
            LogicalDevice::HeadsetMic => (AudioMode::InCommunication, false),
            LogicalDevice::BuiltInMic => (AudioMode::Normal, false),
            _ => return None,
        };
        Some(RoutingFlags {
            mode,
            bluetooth_sco,
            ..Self::BASELINE
        })
    }
}

/// Outcome of a selection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEffect {
    pub flow: DeviceFlow,

    /// Target device, `None` when the requested name was not recognised
    pub device: Option<LogicalDevice>,

    /// Flags merged over the baseline, `None` when nothing was written
    pub flags: Option<RoutingFlags>,
}

/// Applies routing flags through the platform.
pub struct RoutingPolicy {
    platform: Arc<dyn AudioPlatform>,
    wired: Arc<dyn WiredRouteOverride>,
    settle_delay: Duration,
}

impl RoutingPolicy {
    pub fn new(
        platform: Arc<dyn AudioPlatform>,
        wired: Arc<dyn WiredRouteOverride>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            platform,
            wired,
            settle_delay,
        }
    }

    /// Route playback to `device`.
    ///
    /// Not short-circuited: selecting the same device twice writes the same
    /// flags twice and waits out the settle delay twice.
    pub fn select_output(&self, device: Option<LogicalDevice>) -> Result<RoutingEffect, AudioError> {
        let flags = RoutingFlags::for_output(device);
        debug!(?device, ?flags, "Selecting output device");

        self.reset_to_baseline()
            .and_then(|()| self.merge(&flags))
            .map_err(|source| selection_error(DeviceFlow::Output, device, source))?;

        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }

        info!(?device, "Output device selected");
        Ok(RoutingEffect {
            flow: DeviceFlow::Output,
            device,
            flags: Some(flags),
        })
    }

    /// Route capture from `device`.
    pub fn select_input(&self, device: Option<LogicalDevice>) -> Result<RoutingEffect, AudioError> {
        let Some(flags) = RoutingFlags::for_input(device) else {
            warn!(?device, "No input routing for device, leaving flags unchanged");
            return Ok(RoutingEffect {
                flow: DeviceFlow::Input,
                device,
                flags: None,
            });
        };
        debug!(?device, ?flags, "Selecting input device");

        self.apply_input(&flags)
            .map_err(|source| selection_error(DeviceFlow::Input, device, source))?;

        info!(?device, "Input device selected");
        Ok(RoutingEffect {
            flow: DeviceFlow::Input,
            device,
            flags: Some(flags),
        })
    }

    fn reset_to_baseline(&self) -> Result<(), PlatformError> {
        let p = &self.platform;
        p.set_mode(RoutingFlags::BASELINE.mode)?;
        p.stop_bluetooth_sco()?;
        p.set_bluetooth_sco_on(false)?;
        p.set_bluetooth_a2dp_on(false)?;
        p.set_speakerphone_on(false)?;
        Ok(())
    }

    /// Write the fields of `flags` that differ from the baseline.
    fn merge(&self, flags: &RoutingFlags) -> Result<(), PlatformError> {
        let p = &self.platform;
        p.set_mode(flags.mode)?;

        if flags.speakerphone {
            p.set_speakerphone_on(true)?;
        }
        if flags.bluetooth_a2dp {
            p.set_bluetooth_a2dp_on(true)?;
        }
        if flags.bluetooth_sco {
            p.start_bluetooth_sco()?;
            p.set_bluetooth_sco_on(true)?;
        }
        if let Some(available) = flags.wired_headset {
            if let Err(e) = self.wired.set_wired_headset_available(available) {
                warn!(available, error = %e, "Failed to force wired headset route");
            }
        }
        Ok(())
    }

    fn apply_input(&self, flags: &RoutingFlags) -> Result<(), PlatformError> {
        let p = &self.platform;
        p.set_mode(flags.mode)?;
        if flags.bluetooth_sco {
            p.start_bluetooth_sco()?;
            p.set_bluetooth_sco_on(true)?;
        } else {
            p.stop_bluetooth_sco()?;
            p.set_bluetooth_sco_on(false)?;
        }
        Ok(())
    }
}

fn selection_error(
    flow: DeviceFlow,
    device: Option<LogicalDevice>,
    source: PlatformError,
) -> AudioError {
    warn!(%flow, ?device, %source, "Device selection failed");
    AudioError::DeviceSelection {
        flow,
        device: device.map_or_else(|| "unknown".to_string(), |d| d.label().to_string()),
        source,
    }
}
