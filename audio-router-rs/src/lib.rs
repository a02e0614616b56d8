//! Audio Router - Library
//!
//! Audio device routing, volume control and microphone level metering on
//! top of a platform capability interface.
//!
//! ## Features
//!
//! - Priority-ordered logical output and input device lists
//! - Output/input selection through table-driven routing flags
//! - System and microphone stream volume as `[0, 1]` scalars
//! - Microphone test with a normalized input level meter
//! - Cancellable periodic level monitor
//! - Android backend over JNI, simulated backend everywhere else

pub mod app;
pub mod audio;
pub mod config;
pub mod platform;
pub mod router;

pub use app::AudioSession;
pub use audio::{AudioError, DeviceFlow, LogicalDevice, MeterReading, RoutingState};
pub use config::{ConfigError, RouterConfig};
pub use platform::{AudioPlatform, PlatformError, SimulatedPlatform, WiredRouteOverride};
pub use router::AudioRouter;
