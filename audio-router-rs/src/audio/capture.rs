//! Audio capture and level metering.
//!
//! The meter owns a capture stream while recording and turns the most recent
//! buffer into a normalized loudness value on demand.

use super::device::AudioError;
use crate::platform::{AudioPlatform, CaptureFormat, CaptureStream, PlatformError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Full scale of a signed 16-bit sample.
const FULL_SCALE: f32 = 32768.0;

/// Root of the mean absolute sample magnitude, scaled to `[0, 1]`.
///
/// This is the raw quantity the level gain is tuned against.
pub fn raw_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| (*s as f64).abs()).sum();
    let rms = (sum / samples.len() as f64).sqrt();
    ((rms / FULL_SCALE as f64) as f32).clamp(0.0, 1.0)
}

/// Amplify a raw level by `gain` and clamp to `[0, 1]`.
pub fn normalize_level(raw: f32, gain: f32) -> f32 {
    let amplified = raw * gain;
    if amplified.is_nan() {
        0.0
    } else {
        amplified.clamp(0.0, 1.0)
    }
}

/// Level as shown to the user: never above the configured volume ceiling.
pub fn display_level(level: f32, ceiling: f32) -> f32 {
    let ceiling = if ceiling.is_nan() { 0.0 } else { ceiling };
    level.min(ceiling).clamp(0.0, 1.0)
}

/// A level reading prepared for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    /// Normalized input level (0.0 to 1.0)
    pub level: f32,

    /// Volume ceiling the display is capped at
    pub ceiling: f32,

    /// `min(level, ceiling)`
    pub display_level: f32,

    /// Display level as percentage (0-100)
    pub percent: u8,

    /// Display level is close to the ceiling
    pub hot: bool,
}

impl MeterReading {
    pub fn new(level: f32, ceiling: f32, hot_ratio: f32) -> Self {
        let display_level = display_level(level, ceiling);
        Self {
            level,
            ceiling,
            display_level,
            percent: (display_level * 100.0).round() as u8,
            hot: display_level > ceiling * hot_ratio,
        }
    }
}

enum MeterState {
    Idle,
    Recording {
        stream: Box<dyn CaptureStream>,
        buffer: Vec<i16>,
    },
}

/// Microphone level meter (Idle -> Recording -> Idle).
pub struct LevelMeter {
    platform: Arc<dyn AudioPlatform>,
    format: CaptureFormat,
    gain: f32,
    state: MeterState,
}

impl LevelMeter {
    pub fn new(platform: Arc<dyn AudioPlatform>, format: CaptureFormat, gain: f32) -> Self {
        Self {
            platform,
            format,
            gain,
            state: MeterState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, MeterState::Recording { .. })
    }

    /// Start capturing. Already recording is a no-op success.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.is_recording() {
            debug!("Level meter already recording");
            return Ok(());
        }

        if !self.platform.has_record_permission() {
            warn!("Record permission not granted");
            return Err(AudioError::PermissionDenied);
        }

        let size = self
            .platform
            .min_buffer_size(self.format)
            .map_err(AudioError::RecordingInit)?;
        if size <= 0 {
            return Err(AudioError::RecordingInit(PlatformError::call(
                "getMinBufferSize",
                format!("unsupported capture format ({size})"),
            )));
        }
        let size = size as usize;

        let mut stream = self
            .platform
            .open_capture(self.format, size)
            .map_err(AudioError::RecordingInit)?;
        // Dropping the stream on failure releases it.
        stream.start().map_err(AudioError::RecordingInit)?;

        info!(
            sample_rate = self.format.sample_rate,
            buffer_size = size,
            "Level meter recording"
        );
        self.state = MeterState::Recording {
            stream,
            buffer: vec![0; size],
        };
        Ok(())
    }

    /// Stop capturing and release the stream. Idle is a no-op success.
    pub fn stop(&mut self) {
        if let MeterState::Recording { mut stream, .. } =
            std::mem::replace(&mut self.state, MeterState::Idle)
        {
            if let Err(e) = stream.stop() {
                warn!(error = %e, "Failed to stop capture stream, releasing anyway");
            }
            info!("Level meter stopped");
        }
    }

    /// Normalized level of the most recent buffer, 0 when idle.
    pub fn sample(&mut self) -> f32 {
        let gain = self.gain;
        match &mut self.state {
            MeterState::Idle => 0.0,
            MeterState::Recording { stream, buffer } => match stream.read(buffer) {
                Ok(0) => 0.0,
                Ok(n) => normalize_level(raw_level(&buffer[..n.min(buffer.len())]), gain),
                Err(e) => {
                    warn!(error = %e, "Capture read failed, reporting silence");
                    0.0
                }
            },
        }
    }
}

impl Drop for LevelMeter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedPlatform;

    fn meter() -> (Arc<SimulatedPlatform>, LevelMeter) {
        let platform = Arc::new(SimulatedPlatform::phone());
        let meter = LevelMeter::new(platform.clone(), CaptureFormat::mono_pcm16(44_100), 1000.0);
        (platform, meter)
    }

    #[test]
    fn test_raw_level_of_constant_signal() {
        // mean |x| = 4096, sqrt = 64, 64 / 32768
        let samples = [4096i16, -4096, 4096, -4096];
        assert!((raw_level(&samples) - 64.0 / 32768.0).abs() < 1e-7);
        assert_eq!(raw_level(&[]), 0.0);
        assert_eq!(raw_level(&[0, 0, 0]), 0.0);
    }

    #[test]
    fn test_normalize_amplifies_and_clamps() {
        assert!((normalize_level(0.0008, 1000.0) - 0.8).abs() < 1e-5);
        assert_eq!(normalize_level(0.5, 1000.0), 1.0);
        assert_eq!(normalize_level(0.0, 1000.0), 0.0);
    }

    #[test]
    fn test_display_level_is_capped_by_ceiling() {
        assert_eq!(display_level(0.9, 0.3), 0.3);
        assert_eq!(display_level(0.2, 0.3), 0.2);
        for level in [0.0f32, 0.25, 0.5, 1.0] {
            for ceiling in [0.0f32, 0.4, 1.0] {
                assert_eq!(display_level(level, ceiling), level.min(ceiling));
            }
        }
        assert_eq!(display_level(0.7, f32::NAN), 0.0);
    }

    #[test]
    fn test_meter_reading() {
        let reading = MeterReading::new(0.9, 0.3, 0.8);
        assert_eq!(reading.display_level, 0.3);
        assert_eq!(reading.percent, 30);
        assert!(reading.hot);

        let reading = MeterReading::new(0.1, 0.5, 0.8);
        assert_eq!(reading.percent, 10);
        assert!(!reading.hot);
    }

    #[test]
    fn test_sample_while_idle_is_zero() {
        let (platform, mut meter) = meter();
        assert_eq!(meter.sample(), 0.0);
        assert_eq!(platform.open_captures(), 0);
    }

    #[test]
    fn test_sample_while_recording() {
        let (platform, mut meter) = meter();
        // mean |x| = 1, raw = 1/32768, level = 1000/32768
        platform.set_signal(vec![1, -1]);
        meter.start().unwrap();

        let level = meter.sample();
        assert!((level - 1000.0 / 32768.0).abs() < 1e-5);
    }

    #[test]
    fn test_permission_denied_keeps_idle() {
        let (platform, mut meter) = meter();
        platform.set_permission(false);

        let err = meter.start().unwrap_err();
        assert!(matches!(err, AudioError::PermissionDenied));
        assert!(!meter.is_recording());
        assert_eq!(platform.open_captures(), 0);
    }

    #[test]
    fn test_invalid_buffer_size_fails_start() {
        let (platform, mut meter) = meter();
        platform.set_min_buffer_size(-2);

        let err = meter.start().unwrap_err();
        assert_eq!(err.code(), "ERROR_STARTING_MIC_TEST");
        assert!(!meter.is_recording());
    }

    #[test]
    fn test_failed_start_releases_stream() {
        let (platform, mut meter) = meter();
        platform.fail_on("startRecording");

        assert!(meter.start().is_err());
        assert!(!meter.is_recording());
        assert_eq!(platform.open_captures(), 0);
    }

    #[test]
    fn test_read_error_is_zero_and_keeps_recording() {
        let (platform, mut meter) = meter();
        platform.set_signal(vec![1000; 16]);
        meter.start().unwrap();
        platform.fail_reads(true);

        assert_eq!(meter.sample(), 0.0);
        assert!(meter.is_recording());

        platform.fail_reads(false);
        assert!(meter.sample() > 0.0);
    }

    #[test]
    fn test_start_twice_and_stop_twice() {
        let (platform, mut meter) = meter();
        meter.start().unwrap();
        meter.start().unwrap();
        assert_eq!(platform.open_captures(), 1);

        meter.stop();
        meter.stop();
        assert!(!meter.is_recording());
        assert_eq!(platform.open_captures(), 0);
        assert_eq!(meter.sample(), 0.0);
    }
}
