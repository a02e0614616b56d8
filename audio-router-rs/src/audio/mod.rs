//! Audio routing, volume control and level metering.
//!
//! This module provides device enumeration, routing policy, stream volume
//! control, the microphone level meter and its periodic monitor.

pub mod capture;
pub mod device;
pub mod enumerator;
pub mod monitor;
pub mod policy;
pub mod volume;

pub use capture::{display_level, normalize_level, raw_level, LevelMeter, MeterReading};
pub use device::{
    AudioError, DeviceFlow, EndpointType, LogicalDevice, RoutingState, UnknownDevice, VolumeAction,
};
pub use enumerator::{DeviceEnumerator, Presence};
pub use monitor::LevelMonitor;
pub use policy::{RoutingEffect, RoutingFlags, RoutingPolicy};
pub use volume::{unit_scalar, VolumeController};
