//! Session state and lifecycle management.
//!
//! [`AudioSession`] is the caller side of the router: it keeps the device
//! lists, picks a default device, avoids redundant output switches, tracks
//! the microphone volume ceiling and runs the level monitor.

use crate::audio::{unit_scalar, AudioError, LevelMonitor, LogicalDevice, MeterReading};
use crate::config::RouterConfig;
use crate::platform::PlatformError;
use crate::router::AudioRouter;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `f32` shared with the monitor thread.
#[derive(Debug, Clone)]
struct SharedLevel(Arc<AtomicU32>);

impl SharedLevel {
    fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Main session state.
pub struct AudioSession {
    router: AudioRouter,
    config: RouterConfig,

    /// Output devices from the last refresh, highest priority first
    pub outputs: Vec<LogicalDevice>,

    /// Input devices from the last refresh, highest priority first
    pub inputs: Vec<LogicalDevice>,

    /// Last known system volume (0.0 to 1.0)
    system_volume: f32,

    /// Microphone volume set by the user, caps the displayed level
    ceiling: SharedLevel,

    /// Latest normalized input level from the monitor
    level: SharedLevel,

    monitor: Option<LevelMonitor>,

    /// Error state for UI display
    pub error_message: Option<String>,
}

impl AudioSession {
    pub fn new(router: AudioRouter, config: RouterConfig) -> Self {
        let ceiling = SharedLevel::new(config.default_mic_volume);
        Self {
            router,
            config,
            outputs: Vec::new(),
            inputs: Vec::new(),
            system_volume: 0.0,
            ceiling,
            level: SharedLevel::new(0.0),
            monitor: None,
            error_message: None,
        }
    }

    pub fn router(&self) -> &AudioRouter {
        &self.router
    }

    /// Output currently shown as selected (last known-good).
    pub fn selected_output(&self) -> Option<LogicalDevice> {
        self.router.routing().output
    }

    /// Input currently shown as selected (last known-good).
    pub fn selected_input(&self) -> Option<LogicalDevice> {
        self.router.routing().input
    }

    /// Refresh the output list, selecting the first device if none is selected.
    pub fn refresh_outputs(&mut self) -> Result<&[LogicalDevice], AudioError> {
        self.outputs = self.router.get_audio_devices().map_err(|e| self.record(e))?;
        info!(devices = ?self.outputs, "Output devices refreshed");

        if self.selected_output().is_none() {
            if let Some(&first) = self.outputs.first() {
                info!(device = %first, "Selecting default output device");
                // Failure is recorded and the list is still returned.
                if let Err(e) = self.choose_output(first) {
                    debug!(error = %e, "Default output selection failed");
                }
            }
        }
        Ok(&self.outputs)
    }

    /// Refresh the input list, selecting the first device if none is selected.
    pub fn refresh_inputs(&mut self) -> Result<&[LogicalDevice], AudioError> {
        self.inputs = self.router.get_microphone_devices().map_err(|e| self.record(e))?;
        info!(devices = ?self.inputs, "Input devices refreshed");

        if self.selected_input().is_none() {
            if let Some(&first) = self.inputs.first() {
                info!(device = %first, "Selecting default input device");
                if let Err(e) = self.choose_input(first) {
                    debug!(error = %e, "Default input selection failed");
                }
            }
        }
        Ok(&self.inputs)
    }

    /// Switch output, skipping the platform when `device` is already selected.
    ///
    /// Returns whether routing flags were written. On failure the previous
    /// device stays selected.
    pub fn choose_output(&mut self, device: LogicalDevice) -> Result<bool, AudioError> {
        if self.selected_output() == Some(device) {
            debug!(%device, "Output device already selected");
            return Ok(false);
        }

        match self.router.select_output(Some(device)) {
            Ok(_) => {
                self.error_message = None;
                Ok(true)
            }
            Err(e) => {
                warn!(
                    %device,
                    keeping = ?self.selected_output(),
                    "Output selection failed, keeping previous device"
                );
                Err(self.record(e))
            }
        }
    }

    /// Switch input. Always applies the routing flags.
    pub fn choose_input(&mut self, device: LogicalDevice) -> Result<(), AudioError> {
        match self.router.select_input(Some(device)) {
            Ok(_) => {
                self.error_message = None;
                Ok(())
            }
            Err(e) => Err(self.record(e)),
        }
    }

    pub fn system_volume(&self) -> f32 {
        self.system_volume
    }

    /// Re-read the system volume from the platform.
    pub fn refresh_system_volume(&mut self) -> Result<f32, AudioError> {
        self.system_volume = self.router.get_system_volume().map_err(|e| self.record(e))?;
        Ok(self.system_volume)
    }

    /// Set the system volume. The cached value only changes on success.
    pub fn set_system_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.router
            .set_system_volume(volume)
            .map_err(|e| self.record(e))?;
        self.system_volume = unit_scalar(volume);
        Ok(())
    }

    /// Current display ceiling (last microphone volume set by the user).
    pub fn microphone_volume(&self) -> f32 {
        self.ceiling.get()
    }

    /// Set the microphone volume. The display ceiling only changes on
    /// success.
    pub fn set_microphone_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.router
            .set_microphone_volume(volume)
            .map_err(|e| self.record(e))?;
        self.ceiling.set(unit_scalar(volume));
        Ok(())
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_some()
    }

    /// Start the microphone test and push a reading to `sink` every poll
    /// interval.
    pub fn start_monitoring<F>(&mut self, mut sink: F) -> Result<(), AudioError>
    where
        F: FnMut(MeterReading) + Send + 'static,
    {
        if self.monitor.is_some() {
            debug!("Level monitor already running");
            return Ok(());
        }

        self.router
            .start_microphone_test()
            .map_err(|e| self.record(e))?;

        let meter = self.router.meter();
        let level = self.level.clone();
        let ceiling = self.ceiling.clone();
        let hot_ratio = self.config.hot_ratio;

        let spawned = LevelMonitor::spawn(
            self.config.poll_interval(),
            move || match meter.lock() {
                Ok(mut meter) => meter.sample(),
                Err(_) => {
                    error!("Level meter lock poisoned");
                    0.0
                }
            },
            move |value| {
                level.set(value);
                sink(MeterReading::new(value, ceiling.get(), hot_ratio));
            },
        );

        match spawned {
            Ok(monitor) => {
                info!(interval = ?self.config.poll_interval(), "Input level monitoring started");
                self.monitor = Some(monitor);
                Ok(())
            }
            Err(e) => {
                self.router.stop_microphone_test();
                Err(self.record(AudioError::RecordingInit(PlatformError::call(
                    "spawn level monitor",
                    e.to_string(),
                ))))
            }
        }
    }

    /// Stop monitoring and the microphone test. Safe to call when idle.
    pub fn stop_monitoring(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
            info!("Input level monitoring stopped");
        }
        self.router.stop_microphone_test();
        self.level.set(0.0);
    }

    /// Reading built from the latest level and the current ceiling.
    pub fn reading(&self) -> MeterReading {
        MeterReading::new(self.level.get(), self.ceiling.get(), self.config.hot_ratio)
    }

    fn record(&mut self, err: AudioError) -> AudioError {
        error!(code = err.code(), error = %err, "Audio operation failed");
        self.error_message = Some(err.to_string());
        err
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::EndpointType;
    use crate::platform::{SimulatedPlatform, StreamKind};
    use crossbeam::channel;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn session() -> (Arc<SimulatedPlatform>, AudioSession) {
        let platform = Arc::new(SimulatedPlatform::new(
            vec![EndpointType::BuiltinSpeaker, EndpointType::WiredHeadphones],
            vec![EndpointType::BuiltinMic, EndpointType::BluetoothSco],
        ));
        let config = RouterConfig {
            settle_delay_ms: 0,
            poll_interval_ms: 5,
            ..RouterConfig::default()
        };
        let router = AudioRouter::new(platform.clone(), platform.clone(), &config);
        (platform, AudioSession::new(router, config))
    }

    #[test]
    fn test_refresh_selects_highest_priority_device() {
        let (_, mut session) = session();
        let outputs = session.refresh_outputs().unwrap().to_vec();
        let inputs = session.refresh_inputs().unwrap().to_vec();

        assert_eq!(outputs, vec![LogicalDevice::Headset, LogicalDevice::Speaker]);
        assert_eq!(inputs, vec![LogicalDevice::BluetoothMic, LogicalDevice::BuiltInMic]);
        assert_eq!(session.selected_output(), Some(LogicalDevice::Headset));
        assert_eq!(session.selected_input(), Some(LogicalDevice::BluetoothMic));
    }

    #[test]
    fn test_refresh_keeps_existing_selection() {
        let (_, mut session) = session();
        session.choose_output(LogicalDevice::Speaker).unwrap();
        session.refresh_outputs().unwrap();

        assert_eq!(session.selected_output(), Some(LogicalDevice::Speaker));
    }

    #[test]
    fn test_repeated_output_choice_is_short_circuited() {
        let (platform, mut session) = session();
        assert!(session.choose_output(LogicalDevice::Speaker).unwrap());
        platform.take_calls();

        assert!(!session.choose_output(LogicalDevice::Speaker).unwrap());
        assert!(platform.calls().is_empty());
    }

    #[test]
    fn test_failed_output_choice_reverts_to_last_good() {
        let (platform, mut session) = session();
        session.choose_output(LogicalDevice::Speaker).unwrap();
        platform.fail_on("setMode");

        assert!(session.choose_output(LogicalDevice::Headset).is_err());
        assert_eq!(session.selected_output(), Some(LogicalDevice::Speaker));
        assert!(session.error_message.is_some());

        platform.clear_failures();
        session.choose_output(LogicalDevice::Headset).unwrap();
        assert!(session.error_message.is_none());
    }

    #[test]
    fn test_input_choice_does_not_touch_output() {
        let (_, mut session) = session();
        session.choose_output(LogicalDevice::Headset).unwrap();
        session.choose_input(LogicalDevice::BuiltInMic).unwrap();

        assert_eq!(session.selected_output(), Some(LogicalDevice::Headset));
        assert_eq!(session.selected_input(), Some(LogicalDevice::BuiltInMic));
    }

    #[test]
    fn test_system_volume_kept_on_failure() {
        let (platform, mut session) = session();
        platform.set_stream(StreamKind::Music, 3, 15);
        assert!((session.refresh_system_volume().unwrap() - 0.2).abs() < 1e-6);

        platform.fail_on("setStreamVolume");
        assert!(session.set_system_volume(0.9).is_err());
        assert!((session.system_volume() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_nan_system_volume_is_cached_as_silence() {
        let (platform, mut session) = session();
        platform.set_stream(StreamKind::Music, 9, 15);

        session.set_system_volume(f32::NAN).unwrap();
        assert_eq!(session.system_volume(), 0.0);
        assert_eq!(platform.stream(StreamKind::Music), Some((0, 15)));
    }

    #[test]
    fn test_microphone_volume_kept_on_failure() {
        let (platform, mut session) = session();
        session.set_microphone_volume(0.4).unwrap();

        platform.fail_on("setStreamVolume");
        let err = session.set_microphone_volume(0.9).unwrap_err();
        assert_eq!(err.code(), "ERROR_SETTING_MIC_VOLUME");
        assert_eq!(session.microphone_volume(), 0.4);
        assert!(session.error_message.is_some());
    }

    #[test]
    fn test_nan_microphone_volume_keeps_display_capped() {
        let (_, mut session) = session();
        session.set_microphone_volume(f32::NAN).unwrap();

        assert_eq!(session.microphone_volume(), 0.0);
        assert_eq!(session.reading().display_level, 0.0);
    }

    #[test]
    fn test_microphone_volume_sets_ceiling() {
        let (platform, mut session) = session();
        assert_eq!(session.microphone_volume(), 0.5);

        session.set_microphone_volume(0.3).unwrap();
        assert_eq!(session.microphone_volume(), 0.3);
        assert_eq!(platform.stream(StreamKind::VoiceCall), Some((1, 5)));
    }

    #[test]
    fn test_monitoring_caps_display_at_ceiling() {
        let (platform, mut session) = session();
        // Loud signal saturates the normalized level.
        platform.set_signal(vec![i16::MAX, i16::MIN]);
        session.set_microphone_volume(0.3).unwrap();

        let (tx, rx) = channel::unbounded();
        session
            .start_monitoring(move |r| {
                let _ = tx.send(r);
            })
            .unwrap();
        let readings: Vec<MeterReading> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        session.stop_monitoring();

        for reading in &readings {
            assert_eq!(reading.level, 1.0);
            assert_eq!(reading.display_level, 0.3);
            assert_eq!(reading.percent, 30);
            assert!(reading.hot);
        }
    }

    #[test]
    fn test_stop_monitoring_resets_level_and_releases_capture() {
        let (platform, mut session) = session();
        platform.set_signal(vec![100, -100]);
        let (tx, rx) = channel::bounded(1);
        session
            .start_monitoring(move |r| {
                let _ = tx.try_send(r);
            })
            .unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert!(session.reading().level > 0.0);

        session.stop_monitoring();
        session.stop_monitoring();
        assert!(!session.is_monitoring());
        assert_eq!(session.reading().level, 0.0);
        assert_eq!(platform.open_captures(), 0);
    }

    #[test]
    fn test_monitoring_without_permission() {
        let (platform, mut session) = session();
        platform.set_permission(false);

        let err = session.start_monitoring(|_| {}).unwrap_err();
        assert!(matches!(err, AudioError::PermissionDenied));
        assert!(!session.is_monitoring());
        assert_eq!(platform.open_captures(), 0);
    }

    #[test]
    fn test_drop_tears_down_monitor() {
        let (platform, mut session) = session();
        session.start_monitoring(|_| {}).unwrap();
        assert_eq!(platform.open_captures(), 1);

        drop(session);
        assert_eq!(platform.open_captures(), 0);
    }
}
