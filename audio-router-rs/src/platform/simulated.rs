//! In-memory platform.
//!
//! Keeps every routing flag, stream volume and capture signal in memory and
//! records each write in a call log, so routing sequences can be inspected.
//! Individual operations can be made to fail.

use super::{
    AudioMode, AudioPlatform, CaptureFormat, CaptureStream, PlatformError, StreamKind,
    WiredRouteOverride,
};
use crate::audio::{DeviceFlow, EndpointType};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A state-changing call made against the simulated platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCall {
    SetMode(AudioMode),
    StartBluetoothSco,
    StopBluetoothSco,
    SetBluetoothScoOn(bool),
    SetBluetoothA2dpOn(bool),
    SetSpeakerphoneOn(bool),
    SetStreamVolume(StreamKind, i32),
    SetWiredHeadsetAvailable(bool),
}

/// Snapshot of the simulated routing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedFlags {
    pub mode: AudioMode,
    pub sco_started: bool,
    pub sco_on: bool,
    pub a2dp_on: bool,
    pub speakerphone_on: bool,
    pub wired_headset_available: Option<bool>,
}

impl Default for SimulatedFlags {
    fn default() -> Self {
        Self {
            mode: AudioMode::Normal,
            sco_started: false,
            sco_on: false,
            a2dp_on: false,
            speakerphone_on: false,
            wired_headset_available: None,
        }
    }
}

#[derive(Debug)]
struct SimState {
    outputs: Vec<EndpointType>,
    inputs: Vec<EndpointType>,
    flags: SimulatedFlags,
    volumes: HashMap<StreamKind, (i32, i32)>,
    permission: bool,
    min_buffer: i32,
    failing: HashSet<&'static str>,
    calls: Vec<PlatformCall>,
}

#[derive(Debug, Default)]
struct Signal {
    samples: Vec<i16>,
    fail_reads: bool,
}

/// Simulated audio platform.
#[derive(Debug)]
pub struct SimulatedPlatform {
    state: Mutex<SimState>,
    signal: Arc<Mutex<Signal>>,
    open_captures: Arc<AtomicUsize>,
}

impl SimulatedPlatform {
    /// Platform with the given endpoints, permission granted and silent input.
    pub fn new(outputs: Vec<EndpointType>, inputs: Vec<EndpointType>) -> Self {
        let mut volumes = HashMap::new();
        volumes.insert(StreamKind::Music, (7, 15));
        volumes.insert(StreamKind::VoiceCall, (3, 5));

        Self {
            state: Mutex::new(SimState {
                outputs,
                inputs,
                flags: SimulatedFlags::default(),
                volumes,
                permission: true,
                min_buffer: 3528,
                failing: HashSet::new(),
                calls: Vec::new(),
            }),
            signal: Arc::new(Mutex::new(Signal::default())),
            open_captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A phone with a built-in speaker, earpiece and microphone.
    pub fn phone() -> Self {
        Self::new(
            vec![EndpointType::BuiltinEarpiece, EndpointType::BuiltinSpeaker],
            vec![EndpointType::BuiltinMic],
        )
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_endpoints(&self, flow: DeviceFlow, endpoints: Vec<EndpointType>) {
        let mut state = self.lock();
        match flow {
            DeviceFlow::Output => state.outputs = endpoints,
            DeviceFlow::Input => state.inputs = endpoints,
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.lock().permission = granted;
    }

    pub fn set_min_buffer_size(&self, size: i32) {
        self.lock().min_buffer = size;
    }

    pub fn set_stream(&self, stream: StreamKind, current: i32, max: i32) {
        self.lock().volumes.insert(stream, (current, max));
    }

    /// Make every call named `op` fail until [`Self::clear_failures`].
    pub fn fail_on(&self, op: &'static str) {
        self.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Samples returned (repeated) by capture reads.
    pub fn set_signal(&self, samples: Vec<i16>) {
        if let Ok(mut signal) = self.signal.lock() {
            signal.samples = samples;
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        if let Ok(mut signal) = self.signal.lock() {
            signal.fail_reads = fail;
        }
    }

    pub fn flags(&self) -> SimulatedFlags {
        self.lock().flags
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<PlatformCall> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn stream(&self, stream: StreamKind) -> Option<(i32, i32)> {
        self.lock().volumes.get(&stream).copied()
    }

    /// Number of capture streams opened and not yet dropped.
    pub fn open_captures(&self) -> usize {
        self.open_captures.load(Ordering::SeqCst)
    }

    fn check(&self, state: &SimState, op: &'static str) -> Result<(), PlatformError> {
        if state.failing.contains(op) {
            Err(PlatformError::call(op, "simulated failure"))
        } else {
            Ok(())
        }
    }

    fn write(
        &self,
        op: &'static str,
        call: PlatformCall,
        apply: impl FnOnce(&mut SimulatedFlags),
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        self.check(&state, op)?;
        apply(&mut state.flags);
        state.calls.push(call);
        Ok(())
    }
}

impl AudioPlatform for SimulatedPlatform {
    fn endpoint_types(&self, flow: DeviceFlow) -> Result<Vec<EndpointType>, PlatformError> {
        let state = self.lock();
        self.check(&state, "getDevices")?;
        Ok(match flow {
            DeviceFlow::Output => state.outputs.clone(),
            DeviceFlow::Input => state.inputs.clone(),
        })
    }

    fn set_mode(&self, mode: AudioMode) -> Result<(), PlatformError> {
        self.write("setMode", PlatformCall::SetMode(mode), |f| f.mode = mode)
    }

    fn start_bluetooth_sco(&self) -> Result<(), PlatformError> {
        self.write("startBluetoothSco", PlatformCall::StartBluetoothSco, |f| {
            f.sco_started = true
        })
    }

    fn stop_bluetooth_sco(&self) -> Result<(), PlatformError> {
        self.write("stopBluetoothSco", PlatformCall::StopBluetoothSco, |f| {
            f.sco_started = false
        })
    }

    fn set_bluetooth_sco_on(&self, on: bool) -> Result<(), PlatformError> {
        self.write("setBluetoothScoOn", PlatformCall::SetBluetoothScoOn(on), |f| {
            f.sco_on = on
        })
    }

    fn set_bluetooth_a2dp_on(&self, on: bool) -> Result<(), PlatformError> {
        self.write("setBluetoothA2dpOn", PlatformCall::SetBluetoothA2dpOn(on), |f| {
            f.a2dp_on = on
        })
    }

    fn set_speakerphone_on(&self, on: bool) -> Result<(), PlatformError> {
        self.write("setSpeakerphoneOn", PlatformCall::SetSpeakerphoneOn(on), |f| {
            f.speakerphone_on = on
        })
    }

    fn stream_volume(&self, stream: StreamKind) -> Result<i32, PlatformError> {
        let state = self.lock();
        self.check(&state, "getStreamVolume")?;
        Ok(state.volumes.get(&stream).map(|(cur, _)| *cur).unwrap_or(0))
    }

    fn stream_max_volume(&self, stream: StreamKind) -> Result<i32, PlatformError> {
        let state = self.lock();
        self.check(&state, "getStreamMaxVolume")?;
        Ok(state.volumes.get(&stream).map(|(_, max)| *max).unwrap_or(0))
    }

    fn set_stream_volume(&self, stream: StreamKind, index: i32) -> Result<(), PlatformError> {
        let mut state = self.lock();
        self.check(&state, "setStreamVolume")?;
        let entry = state.volumes.entry(stream).or_insert((0, 0));
        entry.0 = index.clamp(0, entry.1);
        state.calls.push(PlatformCall::SetStreamVolume(stream, index));
        Ok(())
    }

    fn has_record_permission(&self) -> bool {
        self.lock().permission
    }

    fn min_buffer_size(&self, _format: CaptureFormat) -> Result<i32, PlatformError> {
        let state = self.lock();
        self.check(&state, "getMinBufferSize")?;
        Ok(state.min_buffer)
    }

    fn open_capture(
        &self,
        _format: CaptureFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn CaptureStream>, PlatformError> {
        let state = self.lock();
        self.check(&state, "AudioRecord")?;
        let fail_start = state.failing.contains("startRecording");
        drop(state);

        self.open_captures.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedCapture {
            signal: Arc::clone(&self.signal),
            open_captures: Arc::clone(&self.open_captures),
            buffer_size,
            cursor: 0,
            recording: false,
            fail_start,
        }))
    }
}

impl WiredRouteOverride for SimulatedPlatform {
    fn set_wired_headset_available(&self, available: bool) -> Result<(), PlatformError> {
        self.write(
            "setWiredDeviceConnectionState",
            PlatformCall::SetWiredHeadsetAvailable(available),
            |f| f.wired_headset_available = Some(available),
        )
    }
}

struct SimulatedCapture {
    signal: Arc<Mutex<Signal>>,
    open_captures: Arc<AtomicUsize>,
    buffer_size: usize,
    cursor: usize,
    recording: bool,
    fail_start: bool,
}

impl CaptureStream for SimulatedCapture {
    fn start(&mut self) -> Result<(), PlatformError> {
        if self.fail_start {
            return Err(PlatformError::call("startRecording", "simulated failure"));
        }
        self.recording = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, PlatformError> {
        if !self.recording {
            return Err(PlatformError::call("read", "not recording"));
        }
        let signal = self
            .signal
            .lock()
            .map_err(|_| PlatformError::call("read", "signal poisoned"))?;
        if signal.fail_reads {
            return Err(PlatformError::call("read", "simulated failure"));
        }
        if signal.samples.is_empty() {
            return Ok(0);
        }

        let n = buf.len().min(self.buffer_size);
        for slot in buf.iter_mut().take(n) {
            *slot = signal.samples[self.cursor % signal.samples.len()];
            self.cursor += 1;
        }
        Ok(n)
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        self.recording = false;
        Ok(())
    }
}

impl Drop for SimulatedCapture {
    fn drop(&mut self) {
        self.open_captures.fetch_sub(1, Ordering::SeqCst);
    }
}
