//! FFI bindings for the audio router.
//!
//! This crate provides C ABI functions for a foreign UI layer. Every call is
//! a single request with a single response or error. All functions use
//! panic::catch_unwind to prevent Rust panics from unwinding across the FFI
//! boundary.

use audio_router_rs::platform::default_platform;
use audio_router_rs::{
    AudioError, AudioPlatform, AudioRouter, LogicalDevice, RouterConfig, WiredRouteOverride,
};
use serde::Serialize;
use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Error Handling
// ============================================================================

/// Error codes returned by FFI functions.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidHandle = -1,
    InvalidArgument = -2,
    DeviceEnumeration = -3,
    DeviceSelection = -4,
    Volume = -5,
    PermissionDenied = -6,
    RecordingInit = -7,
    JsonError = -8,
    PlatformUnavailable = -9,
    Panic = -99,
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::DeviceEnumeration { .. } => ErrorCode::DeviceEnumeration,
            AudioError::DeviceSelection { .. } => ErrorCode::DeviceSelection,
            AudioError::Volume { .. } => ErrorCode::Volume,
            AudioError::PermissionDenied => ErrorCode::PermissionDenied,
            AudioError::RecordingInit(_) => ErrorCode::RecordingInit,
        }
    }
}

struct LastError {
    code: ErrorCode,
    kind: &'static str,
    message: String,
}

/// Thread-local storage for the last error.
thread_local! {
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
}

fn set_last_error(code: ErrorCode, kind: &'static str, message: impl Into<String>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(LastError {
            code,
            kind,
            message: message.into(),
        });
    });
}

fn set_audio_error(err: &AudioError) -> ErrorCode {
    let code = ErrorCode::from(err);
    set_last_error(code, err.code(), err.to_string());
    code
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

// ============================================================================
// Engine Handle Type
// ============================================================================

/// Opaque handle to the router. Actually points to a RouterEngine struct.
pub type AudioRouterHandle = *mut c_void;

/// Internal engine state. Calls are serialized through the mutex.
struct RouterEngine {
    router: Mutex<AudioRouter>,
}

impl RouterEngine {
    fn new(
        platform: Arc<dyn AudioPlatform>,
        wired: Arc<dyn WiredRouteOverride>,
        config: &RouterConfig,
    ) -> Self {
        Self {
            router: Mutex::new(AudioRouter::new(platform, wired, config)),
        }
    }

    fn into_handle(self) -> AudioRouterHandle {
        Box::into_raw(Box::new(self)) as AudioRouterHandle
    }
}

/// Run `f` against the engine behind `handle`, catching panics.
fn with_engine<T>(
    handle: AudioRouterHandle,
    what: &str,
    on_error: impl FnOnce(ErrorCode) -> T,
    f: impl FnOnce(&mut AudioRouter) -> Result<T, ErrorCode>,
) -> T {
    clear_last_error();

    if handle.is_null() {
        set_last_error(ErrorCode::InvalidHandle, "INVALID_HANDLE", "Null engine handle");
        return on_error(ErrorCode::InvalidHandle);
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: non-null handles come from audio_router_create.
        let engine = unsafe { &*(handle as *const RouterEngine) };
        let mut router = engine.router.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut router)
    }));

    match result {
        Ok(Ok(value)) => value,
        Ok(Err(code)) => on_error(code),
        Err(_) => {
            set_last_error(ErrorCode::Panic, "PANIC", format!("Panic during {what}"));
            on_error(ErrorCode::Panic)
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Allocate a C string from a Rust string. Caller must free with audio_router_free_string.
fn alloc_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        // String contained a null byte, replace with empty
        Err(_) => CString::default().into_raw(),
    }
}

/// Parse a C string to a Rust string slice.
unsafe fn parse_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

fn parse_name<'a>(name: *const c_char) -> Result<&'a str, ErrorCode> {
    unsafe { parse_c_str(name) }.ok_or_else(|| {
        set_last_error(ErrorCode::InvalidArgument, "INVALID_ARGUMENT", "Invalid device name");
        ErrorCode::InvalidArgument
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<*mut c_char, ErrorCode> {
    serde_json::to_string(value)
        .map(|json| alloc_c_string(&json))
        .map_err(|e| {
            set_last_error(ErrorCode::JsonError, "JSON_ERROR", e.to_string());
            ErrorCode::JsonError
        })
}

fn device_list(devices: Result<Vec<LogicalDevice>, AudioError>) -> Result<*mut c_char, ErrorCode> {
    let devices = devices.map_err(|e| set_audio_error(&e))?;
    to_json(&devices)
}

fn message(result: Result<String, AudioError>) -> Result<*mut c_char, ErrorCode> {
    result
        .map(|msg| alloc_c_string(&msg))
        .map_err(|e| set_audio_error(&e))
}

fn write_out(out: *mut f32, value: f32) -> Result<i32, ErrorCode> {
    if out.is_null() {
        set_last_error(ErrorCode::InvalidArgument, "INVALID_ARGUMENT", "Null output pointer");
        return Err(ErrorCode::InvalidArgument);
    }
    // SAFETY: caller provides a valid, writable f32.
    unsafe { *out = value };
    Ok(ErrorCode::Success as i32)
}

fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    // Already initialised by an earlier engine or the host.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============================================================================
// FFI Functions - Lifecycle
// ============================================================================

/// Create a new router instance.
///
/// # Arguments
/// * `config_json` - JSON configuration string (can be null for defaults)
///
/// # Returns
/// Handle to the router, or null on failure. Check audio_router_last_error_code() on failure.
///
/// # Safety
/// The returned handle must be freed with audio_router_destroy().
#[no_mangle]
pub extern "C" fn audio_router_create(config_json: *const c_char) -> AudioRouterHandle {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let config = if config_json.is_null() {
            RouterConfig::default()
        } else {
            let json = match unsafe { parse_c_str(config_json) } {
                Some(s) => s,
                None => {
                    set_last_error(ErrorCode::InvalidArgument, "INVALID_ARGUMENT", "Invalid config string");
                    return ptr::null_mut();
                }
            };
            match RouterConfig::from_json(json) {
                Ok(config) => config,
                Err(e) => {
                    set_last_error(ErrorCode::JsonError, "INVALID_CONFIG", e.to_string());
                    return ptr::null_mut();
                }
            }
        };

        init_logging(config.log_level.as_deref());

        let (platform, wired) = match default_platform() {
            Ok(p) => p,
            Err(e) => {
                set_last_error(ErrorCode::PlatformUnavailable, "PLATFORM_UNAVAILABLE", e.to_string());
                return ptr::null_mut();
            }
        };

        let handle = RouterEngine::new(platform, wired, &config).into_handle();
        tracing::info!("Audio router created");
        handle
    });

    match result {
        Ok(handle) => handle,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "PANIC", "Panic during router creation");
            ptr::null_mut()
        }
    }
}

/// Destroy a router instance. Stops a running microphone test.
///
/// # Safety
/// The handle must have been created by audio_router_create() and must not be used after this call.
#[no_mangle]
pub extern "C" fn audio_router_destroy(handle: AudioRouterHandle) {
    if handle.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = Box::from_raw(handle as *mut RouterEngine);
    });
}

// ============================================================================
// FFI Functions - Output Devices
// ============================================================================

/// Get the available output devices, highest priority first.
///
/// # Returns
/// JSON array of device labels, e.g. `["Bluetooth","Speaker"]`. Caller must
/// free with audio_router_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_router_get_audio_devices(handle: AudioRouterHandle) -> *mut c_char {
    with_engine(handle, "output enumeration", null_string, |router| {
        device_list(router.get_audio_devices())
    })
}

/// Route playback to the named device.
///
/// # Returns
/// Result message. Caller must free with audio_router_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_router_select_audio_device(
    handle: AudioRouterHandle,
    device_name: *const c_char,
) -> *mut c_char {
    with_engine(handle, "output selection", null_string, |router| {
        let name = parse_name(device_name)?;
        message(router.select_audio_device(name))
    })
}

// ============================================================================
// FFI Functions - Input Devices
// ============================================================================

/// Get the available microphones, highest priority first.
///
/// # Returns
/// JSON array of device labels. Caller must free with audio_router_free_string().
/// Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_router_get_microphone_devices(handle: AudioRouterHandle) -> *mut c_char {
    with_engine(handle, "input enumeration", null_string, |router| {
        device_list(router.get_microphone_devices())
    })
}

/// Route capture from the named microphone.
///
/// # Returns
/// Result message. Caller must free with audio_router_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_router_select_microphone_device(
    handle: AudioRouterHandle,
    device_name: *const c_char,
) -> *mut c_char {
    with_engine(handle, "input selection", null_string, |router| {
        let name = parse_name(device_name)?;
        message(router.select_microphone_device(name))
    })
}

// ============================================================================
// FFI Functions - Volume
// ============================================================================

/// Read the system volume (0.0 to 1.0) into `out_volume`.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn audio_router_get_system_volume(
    handle: AudioRouterHandle,
    out_volume: *mut f32,
) -> i32 {
    with_engine(handle, "get system volume", code, |router| {
        let volume = router.get_system_volume().map_err(|e| set_audio_error(&e))?;
        write_out(out_volume, volume)
    })
}

/// Set the system volume (0.0 to 1.0).
///
/// # Returns
/// Result message. Caller must free with audio_router_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_router_set_system_volume(
    handle: AudioRouterHandle,
    volume: f32,
) -> *mut c_char {
    with_engine(handle, "set system volume", null_string, |router| {
        message(router.set_system_volume(volume))
    })
}

/// Set the microphone volume (0.0 to 1.0).
///
/// # Returns
/// Result message. Caller must free with audio_router_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_router_set_microphone_volume(
    handle: AudioRouterHandle,
    volume: f32,
) -> *mut c_char {
    with_engine(handle, "set microphone volume", null_string, |router| {
        message(router.set_microphone_volume(volume))
    })
}

// ============================================================================
// FFI Functions - Microphone Test
// ============================================================================

/// Start capturing for the input level meter.
///
/// # Returns
/// 0 on success, negative error code on failure (PermissionDenied when the
/// record permission is missing; the caller should prompt the user).
#[no_mangle]
pub extern "C" fn audio_router_start_microphone_test(handle: AudioRouterHandle) -> i32 {
    with_engine(handle, "start microphone test", code, |router| {
        router
            .start_microphone_test()
            .map(|()| ErrorCode::Success as i32)
            .map_err(|e| set_audio_error(&e))
    })
}

/// Stop capturing. Succeeds when no test is running.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn audio_router_stop_microphone_test(handle: AudioRouterHandle) -> i32 {
    with_engine(handle, "stop microphone test", code, |router| {
        router.stop_microphone_test();
        Ok(ErrorCode::Success as i32)
    })
}

/// Read the normalized input level (0.0 to 1.0) into `out_level`. Reports 0
/// when no test is running. Intended to be polled by the caller's timer.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn audio_router_get_microphone_input_level(
    handle: AudioRouterHandle,
    out_level: *mut f32,
) -> i32 {
    with_engine(handle, "input level", code, |router| {
        let level = router.get_microphone_input_level();
        write_out(out_level, level)
    })
}

fn null_string(_: ErrorCode) -> *mut c_char {
    ptr::null_mut()
}

fn code(code: ErrorCode) -> i32 {
    code as i32
}

// ============================================================================
// FFI Functions - Memory Management
// ============================================================================

/// Free a string allocated by this library.
///
/// # Safety
/// The pointer must have been returned by one of the audio_router_* functions.
/// Do not call this on strings from other sources.
#[no_mangle]
pub extern "C" fn audio_router_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = CString::from_raw(ptr);
    });
}

// ============================================================================
// FFI Functions - Error Handling
// ============================================================================

/// Get the last error code.
///
/// # Returns
/// The error code from the last failed operation, or 0 if no error.
#[no_mangle]
pub extern "C" fn audio_router_last_error_code() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|err| err.code as i32)
            .unwrap_or(0)
    })
}

/// Get the last error kind, e.g. `PERMISSION_DENIED`.
///
/// # Returns
/// Kind string. Caller must free with audio_router_free_string().
/// Returns null if no error.
#[no_mangle]
pub extern "C" fn audio_router_last_error_kind() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|err| alloc_c_string(err.kind))
            .unwrap_or(ptr::null_mut())
    })
}

/// Get the last error message.
///
/// # Returns
/// Error message string. Caller must free with audio_router_free_string().
/// Returns null if no error.
#[no_mangle]
pub extern "C" fn audio_router_last_error_message() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|err| alloc_c_string(&err.message))
            .unwrap_or(ptr::null_mut())
    })
}

// ============================================================================
// FFI Functions - Utility
// ============================================================================

/// Get the library version.
///
/// # Returns
/// Version string. Caller must free with audio_router_free_string().
#[no_mangle]
pub extern "C" fn audio_router_version() -> *mut c_char {
    alloc_c_string(env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use audio_router_rs::SimulatedPlatform;

    fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        audio_router_free_string(ptr);
        s
    }

    fn create() -> AudioRouterHandle {
        let config = CString::new(r#"{"settle_delay_ms": 0}"#).unwrap();
        let handle = audio_router_create(config.as_ptr());
        assert!(!handle.is_null());
        handle
    }

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(
            ErrorCode::from(&AudioError::PermissionDenied),
            ErrorCode::PermissionDenied
        );
    }

    #[test]
    fn test_engine_lifecycle() {
        let handle = audio_router_create(ptr::null());
        assert!(!handle.is_null());
        audio_router_destroy(handle);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CString::new(r#"{"poll_interval_ms": 0}"#).unwrap();
        let handle = audio_router_create(config.as_ptr());
        assert!(handle.is_null());
        assert_eq!(audio_router_last_error_code(), ErrorCode::JsonError as i32);
        assert_eq!(take_string(audio_router_last_error_kind()), "INVALID_CONFIG");
    }

    #[test]
    fn test_null_handle() {
        let devices = audio_router_get_audio_devices(ptr::null_mut());
        assert!(devices.is_null());
        assert_eq!(audio_router_last_error_code(), ErrorCode::InvalidHandle as i32);
    }

    #[test]
    fn test_device_lists_and_selection() {
        let handle = create();

        let outputs = take_string(audio_router_get_audio_devices(handle));
        let outputs: Vec<String> = serde_json::from_str(&outputs).unwrap();
        assert_eq!(outputs, vec!["Speaker"]);

        let inputs = take_string(audio_router_get_microphone_devices(handle));
        assert_eq!(inputs, r#"["Built-in Microphone"]"#);

        let name = CString::new("Speaker").unwrap();
        let result = take_string(audio_router_select_audio_device(handle, name.as_ptr()));
        assert_eq!(result, "Audio device set to Speaker");
        assert_eq!(audio_router_last_error_code(), 0);

        let result = audio_router_select_microphone_device(handle, ptr::null());
        assert!(result.is_null());
        assert_eq!(audio_router_last_error_code(), ErrorCode::InvalidArgument as i32);

        audio_router_destroy(handle);
    }

    #[test]
    fn test_volume_round_trip() {
        let handle = create();

        let result = take_string(audio_router_set_system_volume(handle, 0.6));
        assert_eq!(result, "Volume set to 0.6");

        let mut volume = -1.0f32;
        assert_eq!(audio_router_get_system_volume(handle, &mut volume), 0);
        assert!((volume - 0.6).abs() < 1e-6);

        assert_eq!(
            audio_router_get_system_volume(handle, ptr::null_mut()),
            ErrorCode::InvalidArgument as i32
        );
        assert_eq!(audio_router_last_error_code(), ErrorCode::InvalidArgument as i32);

        audio_router_destroy(handle);
    }

    #[test]
    fn test_microphone_test_cycle() {
        let handle = create();
        let mut level = -1.0f32;

        assert_eq!(audio_router_get_microphone_input_level(handle, &mut level), 0);
        assert_eq!(level, 0.0);

        assert_eq!(audio_router_start_microphone_test(handle), 0);
        assert_eq!(audio_router_get_microphone_input_level(handle, &mut level), 0);
        assert!((0.0..=1.0).contains(&level));

        assert_eq!(audio_router_stop_microphone_test(handle), 0);
        assert_eq!(audio_router_stop_microphone_test(handle), 0);

        audio_router_destroy(handle);
    }

    #[test]
    fn test_microphone_test_without_permission() {
        let platform = Arc::new(SimulatedPlatform::phone());
        platform.set_permission(false);
        let config = RouterConfig {
            settle_delay_ms: 0,
            ..RouterConfig::default()
        };
        let handle = RouterEngine::new(platform.clone(), platform.clone(), &config).into_handle();

        assert_eq!(
            audio_router_start_microphone_test(handle),
            ErrorCode::PermissionDenied as i32
        );
        assert_eq!(audio_router_last_error_code(), -6);
        assert_eq!(take_string(audio_router_last_error_kind()), "PERMISSION_DENIED");
        assert!(!take_string(audio_router_last_error_message()).is_empty());
        assert_eq!(platform.open_captures(), 0);

        audio_router_destroy(handle);
    }

    #[test]
    fn test_version() {
        let version = take_string(audio_router_version());
        assert!(!version.is_empty());
    }
}
