//! Boundary operations.
//!
//! [`AudioRouter`] is what a UI layer talks to: device lists as labels,
//! selection by label, scalar volumes and the microphone test. It also owns
//! the process-wide [`RoutingState`].

use crate::audio::{
    AudioError, DeviceEnumerator, DeviceFlow, LevelMeter, LogicalDevice, RoutingEffect,
    RoutingPolicy, RoutingState, VolumeController,
};
use crate::config::RouterConfig;
use crate::platform::{AudioPlatform, WiredRouteOverride};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Audio routing, volume and metering facade.
pub struct AudioRouter {
    enumerator: DeviceEnumerator,
    policy: RoutingPolicy,
    volume: VolumeController,
    meter: Arc<Mutex<LevelMeter>>,
    routing: RoutingState,
}

impl AudioRouter {
    pub fn new(
        platform: Arc<dyn AudioPlatform>,
        wired: Arc<dyn WiredRouteOverride>,
        config: &RouterConfig,
    ) -> Self {
        Self {
            enumerator: DeviceEnumerator::new(platform.clone()),
            policy: RoutingPolicy::new(platform.clone(), wired, config.settle_delay()),
            volume: VolumeController::new(platform.clone()),
            meter: Arc::new(Mutex::new(LevelMeter::new(
                platform,
                config.capture_format(),
                config.level_gain,
            ))),
            routing: RoutingState::default(),
        }
    }

    /// Last successfully selected output and input.
    pub fn routing(&self) -> RoutingState {
        self.routing
    }

    /// Shared handle to the level meter, for periodic sampling.
    pub fn meter(&self) -> Arc<Mutex<LevelMeter>> {
        Arc::clone(&self.meter)
    }

    fn lock_meter(&self) -> MutexGuard<'_, LevelMeter> {
        self.meter.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_audio_devices(&self) -> Result<Vec<LogicalDevice>, AudioError> {
        self.enumerator.enumerate_outputs()
    }

    /// Route playback to the device labelled `name`.
    pub fn select_audio_device(&mut self, name: &str) -> Result<String, AudioError> {
        let effect = self.select_output(LogicalDevice::parse_for(name, DeviceFlow::Output))?;
        debug!(?effect, "Output routing applied");
        Ok(format!("Audio device set to {name}"))
    }

    /// Typed variant of [`Self::select_audio_device`].
    pub fn select_output(&mut self, device: Option<LogicalDevice>) -> Result<RoutingEffect, AudioError> {
        let effect = self.policy.select_output(device)?;
        self.routing.output = device;
        Ok(effect)
    }

    pub fn get_microphone_devices(&self) -> Result<Vec<LogicalDevice>, AudioError> {
        self.enumerator.enumerate_inputs()
    }

    /// Route capture from the device labelled `name`.
    pub fn select_microphone_device(&mut self, name: &str) -> Result<String, AudioError> {
        let effect = self.select_input(LogicalDevice::parse_for(name, DeviceFlow::Input))?;
        debug!(?effect, "Input routing applied");
        Ok(format!("Microphone set to {name}"))
    }

    /// Typed variant of [`Self::select_microphone_device`].
    pub fn select_input(&mut self, device: Option<LogicalDevice>) -> Result<RoutingEffect, AudioError> {
        let effect = self.policy.select_input(device)?;
        if device.is_some() {
            self.routing.input = device;
        }
        Ok(effect)
    }

    pub fn get_system_volume(&self) -> Result<f32, AudioError> {
        self.volume.system_volume()
    }

    pub fn set_system_volume(&self, volume: f32) -> Result<String, AudioError> {
        self.volume.set_system_volume(volume)?;
        info!(volume, "System volume set");
        Ok(format!("Volume set to {volume}"))
    }

    pub fn set_microphone_volume(&self, volume: f32) -> Result<String, AudioError> {
        self.volume.set_microphone_volume(volume)?;
        info!(volume, "Microphone volume set");
        Ok(format!("Microphone volume set to {volume}"))
    }

    pub fn start_microphone_test(&self) -> Result<(), AudioError> {
        self.lock_meter().start()
    }

    pub fn stop_microphone_test(&self) {
        self.lock_meter().stop();
    }

    /// Normalized input level, 0 when no test is running.
    pub fn get_microphone_input_level(&self) -> f32 {
        self.lock_meter().sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::EndpointType;
    use crate::platform::{AudioMode, SimulatedPlatform, StreamKind};

    fn router() -> (Arc<SimulatedPlatform>, AudioRouter) {
        let platform = Arc::new(SimulatedPlatform::new(
            vec![EndpointType::BuiltinSpeaker, EndpointType::BluetoothA2dp],
            vec![EndpointType::BuiltinMic, EndpointType::WiredHeadset],
        ));
        let config = RouterConfig {
            settle_delay_ms: 0,
            ..RouterConfig::default()
        };
        let router = AudioRouter::new(platform.clone(), platform.clone(), &config);
        (platform, router)
    }

    #[test]
    fn test_device_lists() {
        let (_, router) = router();
        assert_eq!(
            router.get_audio_devices().unwrap(),
            vec![LogicalDevice::Bluetooth, LogicalDevice::Speaker]
        );
        assert_eq!(
            router.get_microphone_devices().unwrap(),
            vec![LogicalDevice::HeadsetMic, LogicalDevice::BuiltInMic]
        );
    }

    #[test]
    fn test_select_by_label() {
        let (platform, mut router) = router();
        let message = router.select_audio_device("Speaker").unwrap();

        assert_eq!(message, "Audio device set to Speaker");
        assert_eq!(router.routing().output, Some(LogicalDevice::Speaker));
        assert!(platform.flags().speakerphone_on);
    }

    #[test]
    fn test_selections_are_independent() {
        let (_, mut router) = router();
        router.select_audio_device("Bluetooth").unwrap();
        router.select_microphone_device("Headset Microphone").unwrap();
        assert_eq!(router.routing().output, Some(LogicalDevice::Bluetooth));

        router.select_audio_device("Speaker").unwrap();
        assert_eq!(router.routing().input, Some(LogicalDevice::HeadsetMic));
    }

    #[test]
    fn test_unknown_output_clears_selection() {
        let (platform, mut router) = router();
        router.select_audio_device("Speaker").unwrap();

        let message = router.select_audio_device("Earpiece").unwrap();
        assert_eq!(message, "Audio device set to Earpiece");
        assert_eq!(router.routing().output, None);
        assert_eq!(platform.flags().mode, AudioMode::Normal);
    }

    #[test]
    fn test_unknown_input_keeps_selection() {
        let (platform, mut router) = router();
        router.select_microphone_device("Built-in Microphone").unwrap();
        platform.take_calls();

        router.select_microphone_device("Speaker").unwrap();
        assert_eq!(router.routing().input, Some(LogicalDevice::BuiltInMic));
        assert!(platform.calls().is_empty());
    }

    #[test]
    fn test_failed_selection_keeps_routing_state() {
        let (platform, mut router) = router();
        router.select_audio_device("Speaker").unwrap();
        platform.fail_on("setSpeakerphoneOn");

        let err = router.select_audio_device("Bluetooth").unwrap_err();
        assert_eq!(err.code(), "ERROR_SELECTING_DEVICE");
        assert_eq!(router.routing().output, Some(LogicalDevice::Speaker));
    }

    #[test]
    fn test_volume_messages() {
        let (platform, router) = router();
        assert_eq!(router.set_system_volume(0.6).unwrap(), "Volume set to 0.6");
        assert_eq!(
            router.set_microphone_volume(0.4).unwrap(),
            "Microphone volume set to 0.4"
        );
        assert_eq!(platform.stream(StreamKind::Music), Some((9, 15)));
        assert_eq!(platform.stream(StreamKind::VoiceCall), Some((2, 5)));
        assert!((router.get_system_volume().unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_microphone_test_cycle() {
        let (platform, router) = router();
        platform.set_signal(vec![0, 1, 0, -1]);
        assert_eq!(router.get_microphone_input_level(), 0.0);

        router.start_microphone_test().unwrap();
        assert!(router.get_microphone_input_level() > 0.0);

        router.stop_microphone_test();
        router.stop_microphone_test();
        assert_eq!(router.get_microphone_input_level(), 0.0);
        assert_eq!(platform.open_captures(), 0);
    }

    #[test]
    fn test_microphone_test_without_permission() {
        let (platform, router) = router();
        platform.set_permission(false);

        let err = router.start_microphone_test().unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
        assert_eq!(platform.open_captures(), 0);
    }
}
