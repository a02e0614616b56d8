//! Platform capability interface.
//!
//! Everything the router needs from the operating system goes through
//! [`AudioPlatform`]. The Android backend talks to `AudioManager` and
//! `AudioRecord` over JNI; the simulated backend keeps all state in memory.

#[cfg(target_os = "android")]
pub mod android;
pub mod simulated;

use crate::audio::{DeviceFlow, EndpointType};
use std::sync::Arc;
use thiserror::Error;

#[cfg(target_os = "android")]
pub use android::{AndroidPlatform, AndroidWiredOverride};
pub use simulated::{PlatformCall, SimulatedPlatform};

/// Failure of a single platform call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("{op} failed: {message}")]
    Call { op: &'static str, message: String },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl PlatformError {
    pub fn call(op: &'static str, message: impl Into<String>) -> Self {
        PlatformError::Call {
            op,
            message: message.into(),
        }
    }
}

/// System audio mode (maps to `AudioManager.MODE_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AudioMode {
    Normal = 0,
    InCommunication = 3,
}

/// Volume stream (maps to `AudioManager.STREAM_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StreamKind {
    VoiceCall = 0,
    Music = 3,
}

/// PCM capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl CaptureFormat {
    /// Mono 16-bit PCM at the given rate.
    pub fn mono_pcm16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

/// System audio manager operations.
pub trait AudioPlatform: Send + Sync {
    /// Raw types of every endpoint currently present for `flow`.
    fn endpoint_types(&self, flow: DeviceFlow) -> Result<Vec<EndpointType>, PlatformError>;

    fn set_mode(&self, mode: AudioMode) -> Result<(), PlatformError>;
    fn start_bluetooth_sco(&self) -> Result<(), PlatformError>;
    fn stop_bluetooth_sco(&self) -> Result<(), PlatformError>;
    fn set_bluetooth_sco_on(&self, on: bool) -> Result<(), PlatformError>;
    fn set_bluetooth_a2dp_on(&self, on: bool) -> Result<(), PlatformError>;
    fn set_speakerphone_on(&self, on: bool) -> Result<(), PlatformError>;

    fn stream_volume(&self, stream: StreamKind) -> Result<i32, PlatformError>;
    fn stream_max_volume(&self, stream: StreamKind) -> Result<i32, PlatformError>;
    fn set_stream_volume(&self, stream: StreamKind, index: i32) -> Result<(), PlatformError>;

    /// Whether the process currently holds the record-audio permission.
    fn has_record_permission(&self) -> bool;

    /// Minimum capture buffer size in samples. Non-positive means unsupported.
    fn min_buffer_size(&self, format: CaptureFormat) -> Result<i32, PlatformError>;

    /// Open (but do not start) a capture stream.
    fn open_capture(
        &self,
        format: CaptureFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn CaptureStream>, PlatformError>;
}

/// An open capture stream. Dropping it releases the platform resources.
pub trait CaptureStream: Send {
    fn start(&mut self) -> Result<(), PlatformError>;

    /// Read up to `buf.len()` samples, returning how many were written.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, PlatformError>;

    fn stop(&mut self) -> Result<(), PlatformError>;
}

/// Forcing the wired headset route on or off.
///
/// Only reachable through hidden platform APIs, so callers must treat every
/// failure as best-effort.
pub trait WiredRouteOverride: Send + Sync {
    fn set_wired_headset_available(&self, available: bool) -> Result<(), PlatformError>;
}

/// Override used when the platform offers no way to force the wired route.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWiredOverride;

impl WiredRouteOverride for NoWiredOverride {
    fn set_wired_headset_available(&self, available: bool) -> Result<(), PlatformError> {
        tracing::debug!(available, "Wired route override not available, ignoring");
        Ok(())
    }
}

/// Platform handle paired with its wired route override.
pub type PlatformHandles = (Arc<dyn AudioPlatform>, Arc<dyn WiredRouteOverride>);

/// Platform and wired override for the current target.
#[cfg(target_os = "android")]
pub fn default_platform() -> Result<PlatformHandles, PlatformError> {
    let platform = AndroidPlatform::new()?;
    let wired: Arc<dyn WiredRouteOverride> = Arc::new(AndroidWiredOverride::new(&platform));
    let platform: Arc<dyn AudioPlatform> = Arc::new(platform);
    Ok((platform, wired))
}

/// Platform and wired override for the current target.
///
/// Hosts without an Android runtime get a simulated device set (speaker and
/// built-in microphone) so the bridge stays usable for development.
#[cfg(not(target_os = "android"))]
pub fn default_platform() -> Result<PlatformHandles, PlatformError> {
    let simulated = Arc::new(SimulatedPlatform::phone());
    let wired: Arc<dyn WiredRouteOverride> = simulated.clone();
    let platform: Arc<dyn AudioPlatform> = simulated;
    Ok((platform, wired))
}
