//! Android backend over JNI.
//!
//! Wraps `android.media.AudioManager` for routing and volume and
//! `android.media.AudioRecord` for capture.

use super::{
    AudioMode, AudioPlatform, CaptureFormat, CaptureStream, PlatformError, StreamKind,
    WiredRouteOverride,
};
use crate::audio::{DeviceFlow, EndpointType};
use jni::objects::{GlobalRef, JObject, JObjectArray, JValue};
use jni::sys::jobject;
use jni::{Executor, JNIEnv, JavaVM};
use std::sync::Arc;
use tracing::{debug, error};

const GET_DEVICES_INPUTS: i32 = 1;
const GET_DEVICES_OUTPUTS: i32 = 2;

const AUDIO_SOURCE_MIC: i32 = 1;
const CHANNEL_IN_MONO: i32 = 16;
const ENCODING_PCM_16BIT: i32 = 2;
const STATE_INITIALIZED: i32 = 1;

const DEVICE_OUT_WIRED_HEADSET: i32 = 4;
const PERMISSION_GRANTED: i32 = 0;

/// Run `f` on an attached thread, clearing any pending Java exception.
fn call<T>(
    executor: &Executor,
    op: &'static str,
    f: impl FnOnce(&mut JNIEnv) -> jni::errors::Result<T>,
) -> Result<T, PlatformError> {
    executor
        .with_attached(|env| {
            let result = f(env);
            if matches!(result, Err(jni::errors::Error::JavaException)) {
                env.exception_describe()?;
                env.exception_clear()?;
            }
            Ok::<_, jni::errors::Error>(result)
        })
        .and_then(|result| result)
        .map_err(|e| PlatformError::call(op, e.to_string()))
}

/// `AudioManager`-backed platform.
pub struct AndroidPlatform {
    executor: Executor,
    context: GlobalRef,
    audio_manager: GlobalRef,
}

impl AndroidPlatform {
    /// Attach to the process VM and look up the audio service.
    pub fn new() -> Result<Self, PlatformError> {
        let ctx = ndk_context::android_context();
        let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }
            .map_err(|e| PlatformError::call("JavaVM", e.to_string()))?;
        let executor = Executor::new(Arc::new(vm));

        let (context, audio_manager) = call(&executor, "getSystemService", |env| {
            let context = unsafe { JObject::from_raw(ctx.context() as jobject) };
            let name = env.new_string("audio")?;
            let manager = env
                .call_method(
                    &context,
                    "getSystemService",
                    "(Ljava/lang/String;)Ljava/lang/Object;",
                    &[(&name).into()],
                )?
                .l()?;
            Ok((env.new_global_ref(&context)?, env.new_global_ref(&manager)?))
        })?;

        debug!("AudioManager acquired");
        Ok(Self {
            executor,
            context,
            audio_manager,
        })
    }

    fn void(&self, op: &'static str, sig: &'static str, args: &[JValue]) -> Result<(), PlatformError> {
        call(&self.executor, op, |env| {
            env.call_method(&self.audio_manager, op, sig, args)?.v()
        })
    }

    fn int(&self, op: &'static str, sig: &'static str, args: &[JValue]) -> Result<i32, PlatformError> {
        call(&self.executor, op, |env| {
            env.call_method(&self.audio_manager, op, sig, args)?.i()
        })
    }
}

impl AudioPlatform for AndroidPlatform {
    fn endpoint_types(&self, flow: DeviceFlow) -> Result<Vec<EndpointType>, PlatformError> {
        let flags = match flow {
            DeviceFlow::Output => GET_DEVICES_OUTPUTS,
            DeviceFlow::Input => GET_DEVICES_INPUTS,
        };

        call(&self.executor, "getDevices", |env| {
            let devices = env
                .call_method(
                    &self.audio_manager,
                    "getDevices",
                    "(I)[Landroid/media/AudioDeviceInfo;",
                    &[JValue::Int(flags)],
                )?
                .l()?;
            let devices = JObjectArray::from(devices);
            let count = env.get_array_length(&devices)?;

            let mut types = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = env.get_object_array_element(&devices, i)?;
                let code = env.call_method(&device, "getType", "()I", &[])?.i()?;
                env.delete_local_ref(device)?;
                types.push(EndpointType::from_raw(code));
            }
            Ok(types)
        })
    }

    fn set_mode(&self, mode: AudioMode) -> Result<(), PlatformError> {
        self.void("setMode", "(I)V", &[JValue::Int(mode as i32)])
    }

    fn start_bluetooth_sco(&self) -> Result<(), PlatformError> {
        self.void("startBluetoothSco", "()V", &[])
    }

    fn stop_bluetooth_sco(&self) -> Result<(), PlatformError> {
        self.void("stopBluetoothSco", "()V", &[])
    }

    fn set_bluetooth_sco_on(&self, on: bool) -> Result<(), PlatformError> {
        self.void("setBluetoothScoOn", "(Z)V", &[JValue::Bool(on.into())])
    }

    fn set_bluetooth_a2dp_on(&self, on: bool) -> Result<(), PlatformError> {
        self.void("setBluetoothA2dpOn", "(Z)V", &[JValue::Bool(on.into())])
    }

    fn set_speakerphone_on(&self, on: bool) -> Result<(), PlatformError> {
        self.void("setSpeakerphoneOn", "(Z)V", &[JValue::Bool(on.into())])
    }

    fn stream_volume(&self, stream: StreamKind) -> Result<i32, PlatformError> {
        self.int("getStreamVolume", "(I)I", &[JValue::Int(stream as i32)])
    }

    fn stream_max_volume(&self, stream: StreamKind) -> Result<i32, PlatformError> {
        self.int("getStreamMaxVolume", "(I)I", &[JValue::Int(stream as i32)])
    }

    fn set_stream_volume(&self, stream: StreamKind, index: i32) -> Result<(), PlatformError> {
        self.void(
            "setStreamVolume",
            "(III)V",
            &[JValue::Int(stream as i32), JValue::Int(index), JValue::Int(0)],
        )
    }

    fn has_record_permission(&self) -> bool {
        let result = call(&self.executor, "checkSelfPermission", |env| {
            let permission = env.new_string("android.permission.RECORD_AUDIO")?;
            env.call_method(
                &self.context,
                "checkSelfPermission",
                "(Ljava/lang/String;)I",
                &[(&permission).into()],
            )?
            .i()
        });
        match result {
            Ok(status) => status == PERMISSION_GRANTED,
            Err(e) => {
                error!(error = %e, "Permission check failed");
                false
            }
        }
    }

    fn min_buffer_size(&self, format: CaptureFormat) -> Result<i32, PlatformError> {
        call(&self.executor, "getMinBufferSize", |env| {
            env.call_static_method(
                "android/media/AudioRecord",
                "getMinBufferSize",
                "(III)I",
                &[
                    JValue::Int(format.sample_rate as i32),
                    JValue::Int(CHANNEL_IN_MONO),
                    JValue::Int(ENCODING_PCM_16BIT),
                ],
            )?
            .i()
        })
    }

    fn open_capture(
        &self,
        format: CaptureFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn CaptureStream>, PlatformError> {
        let record = call(&self.executor, "AudioRecord", |env| {
            let record = env.new_object(
                "android/media/AudioRecord",
                "(IIIII)V",
                &[
                    JValue::Int(AUDIO_SOURCE_MIC),
                    JValue::Int(format.sample_rate as i32),
                    JValue::Int(CHANNEL_IN_MONO),
                    JValue::Int(ENCODING_PCM_16BIT),
                    JValue::Int(buffer_size as i32),
                ],
            )?;
            let state = env.call_method(&record, "getState", "()I", &[])?.i()?;
            if state != STATE_INITIALIZED {
                env.call_method(&record, "release", "()V", &[])?;
                return Ok(None);
            }
            Ok(Some(env.new_global_ref(&record)?))
        })?;

        let record = record
            .ok_or_else(|| PlatformError::call("AudioRecord", "failed to initialize AudioRecord"))?;
        Ok(Box::new(AndroidCapture {
            executor: self.executor.clone(),
            record,
        }))
    }
}

struct AndroidCapture {
    executor: Executor,
    record: GlobalRef,
}

impl CaptureStream for AndroidCapture {
    fn start(&mut self) -> Result<(), PlatformError> {
        call(&self.executor, "startRecording", |env| {
            env.call_method(&self.record, "startRecording", "()V", &[])?.v()
        })
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, PlatformError> {
        call(&self.executor, "read", |env| {
            let len = buf.len() as i32;
            let array = env.new_short_array(len)?;
            let read = env
                .call_method(
                    &self.record,
                    "read",
                    "([SII)I",
                    &[JValue::Object(&array), JValue::Int(0), JValue::Int(len)],
                )?
                .i()?;
            if read <= 0 {
                return Ok(0);
            }
            let read = (read as usize).min(buf.len());
            env.get_short_array_region(&array, 0, &mut buf[..read])?;
            Ok(read)
        })
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        call(&self.executor, "stop", |env| {
            env.call_method(&self.record, "stop", "()V", &[])?.v()
        })
    }
}

impl Drop for AndroidCapture {
    fn drop(&mut self) {
        let released = call(&self.executor, "release", |env| {
            env.call_method(&self.record, "release", "()V", &[])?.v()
        });
        if let Err(e) = released {
            error!(error = %e, "Failed to release AudioRecord");
        }
    }
}

/// Forces the wired headset route through the hidden
/// `AudioManager.setWiredDeviceConnectionState`.
///
/// The method is not part of the public SDK and is blocked on most recent
/// releases; callers treat failures as best-effort.
pub struct AndroidWiredOverride {
    executor: Executor,
    audio_manager: GlobalRef,
}

impl AndroidWiredOverride {
    pub fn new(platform: &AndroidPlatform) -> Self {
        Self {
            executor: platform.executor.clone(),
            audio_manager: platform.audio_manager.clone(),
        }
    }
}

impl WiredRouteOverride for AndroidWiredOverride {
    fn set_wired_headset_available(&self, available: bool) -> Result<(), PlatformError> {
        call(&self.executor, "setWiredDeviceConnectionState", |env| {
            let address = env.new_string("")?;
            env.call_method(
                &self.audio_manager,
                "setWiredDeviceConnectionState",
                "(IILjava/lang/String;)V",
                &[
                    JValue::Int(DEVICE_OUT_WIRED_HEADSET),
                    JValue::Int(i32::from(available)),
                    (&address).into(),
                ],
            )?
            .v()
        })
    }
}
