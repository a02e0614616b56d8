//! Audio router demo.
//!
//! Runs the router against the simulated platform: lists devices, applies
//! the default routing, sets volumes and runs a short microphone test.
//!
//! Set `AUDIO_ROUTER_CONFIG` to a JSON config file to override defaults and
//! `RUST_LOG` to control log output.

use anyhow::Context;
use audio_router_rs::audio::EndpointType;
use audio_router_rs::{AudioRouter, AudioSession, RouterConfig, SimulatedPlatform};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = match std::env::var_os("AUDIO_ROUTER_CONFIG") {
        Some(path) => RouterConfig::load(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?,
        None => RouterConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_deref().unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let platform = Arc::new(SimulatedPlatform::new(
        vec![
            EndpointType::BuiltinEarpiece,
            EndpointType::BuiltinSpeaker,
            EndpointType::WiredHeadset,
        ],
        vec![EndpointType::BuiltinMic, EndpointType::WiredHeadset],
    ));
    platform.set_signal(test_tone());

    let router = AudioRouter::new(platform.clone(), platform.clone(), &config);
    let mut session = AudioSession::new(router, config);

    let outputs = session.refresh_outputs()?.to_vec();
    let inputs = session.refresh_inputs()?.to_vec();
    println!("Outputs: {}", join(&outputs));
    println!("Inputs:  {}", join(&inputs));
    println!(
        "Selected: output={:?} input={:?}",
        session.selected_output(),
        session.selected_input()
    );

    let volume = session.refresh_system_volume()?;
    println!("System volume: {:.0}%", volume * 100.0);
    session.set_microphone_volume(0.6)?;

    session.start_monitoring(|reading| {
        let bar = "#".repeat(reading.percent as usize / 5);
        let marker = if reading.hot { " !" } else { "" };
        println!("Input level {:>3}% |{:<20}|{}", reading.percent, bar, marker);
    })?;
    thread::sleep(Duration::from_secs(1));
    session.stop_monitoring();

    Ok(())
}

/// A quiet 441 Hz tone, one period at 44.1 kHz.
fn test_tone() -> Vec<i16> {
    (0..100)
        .map(|i| {
            let phase = i as f32 / 100.0 * std::f32::consts::TAU;
            (phase.sin() * 40.0) as i16
        })
        .collect()
}

fn join(devices: &[audio_router_rs::LogicalDevice]) -> String {
    devices
        .iter()
        .map(|d| d.label())
        .collect::<Vec<_>>()
        .join(", ")
}
