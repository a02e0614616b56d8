//! Stream volume control.
//!
//! Volumes cross the API as scalars in `[0, 1]` and are mapped onto the
//! platform's integer stream indices.

use super::device::{AudioError, VolumeAction};
use crate::platform::{AudioPlatform, PlatformError, StreamKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Volume controller for the music (system) and voice-call (microphone) streams.
pub struct VolumeController {
    platform: Arc<dyn AudioPlatform>,
}

impl VolumeController {
    pub fn new(platform: Arc<dyn AudioPlatform>) -> Self {
        Self { platform }
    }

    /// Get the current system volume level (0.0 to 1.0).
    pub fn system_volume(&self) -> Result<f32, AudioError> {
        let action = VolumeAction::GetSystem;
        let current = self
            .platform
            .stream_volume(StreamKind::Music)
            .map_err(|e| volume_error(action, e))?;
        let max = self.max_index(StreamKind::Music, action)?;

        Ok((current as f32 / max as f32).clamp(0.0, 1.0))
    }

    /// Set the system volume level (0.0 to 1.0).
    pub fn set_system_volume(&self, level: f32) -> Result<(), AudioError> {
        self.set_stream(StreamKind::Music, level, VolumeAction::SetSystem)
    }

    /// Set the microphone (voice-call stream) volume level (0.0 to 1.0).
    pub fn set_microphone_volume(&self, level: f32) -> Result<(), AudioError> {
        self.set_stream(StreamKind::VoiceCall, level, VolumeAction::SetMicrophone)
    }

    fn set_stream(&self, stream: StreamKind, level: f32, action: VolumeAction) -> Result<(), AudioError> {
        let max = self.max_index(stream, action)?;
        let index = scalar_to_index(level, max);
        debug!(?stream, level, index, max, "Setting stream volume");

        self.platform
            .set_stream_volume(stream, index)
            .map_err(|e| volume_error(action, e))
    }

    fn max_index(&self, stream: StreamKind, action: VolumeAction) -> Result<i32, AudioError> {
        let max = self
            .platform
            .stream_max_volume(stream)
            .map_err(|e| volume_error(action, e))?;
        if max <= 0 {
            return Err(volume_error(
                action,
                PlatformError::call("getStreamMaxVolume", format!("invalid maximum {max}")),
            ));
        }
        Ok(max)
    }
}

/// Clamp a volume scalar to `[0, 1]`. NaN reads as silence.
pub fn unit_scalar(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Truncating scalar to index conversion, with the scalar clamped to `[0, 1]`.
pub fn scalar_to_index(level: f32, max: i32) -> i32 {
    (unit_scalar(level) * max as f32) as i32
}

fn volume_error(action: VolumeAction, source: PlatformError) -> AudioError {
    warn!(%action, %source, "Volume operation failed");
    AudioError::Volume { action, source }
}
