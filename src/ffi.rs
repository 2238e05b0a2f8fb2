//! C FFI layer for posebridge.
//!
//! Provides an opaque handle-based API for the host runtime plugin shim.
//! The generated C header is written to `include/posebridge.h` by cbindgen.

use crate::channel::Channel;
use crate::codec;
use crate::config::BridgeConfig;
use crate::engine::{Frame, PoseEngine};
use crate::error::LastError;
use crate::input::InputSnapshot;
use crate::types::{ControllerInputs, DevicePose, Hand, Signals};
use crate::BridgeError;
use std::ffi::{c_char, c_int, CStr};
use std::path::Path;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque channel handle for C consumers.
pub struct PbChannel(Channel);

/// Opaque pose engine handle for C consumers.
pub struct PbEngine(PoseEngine);

/// Manual input sampled by the host for one tick.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PbInput {
    /// Bitwise OR of held `Signals`.
    pub signals: u32,
    pub pointer_dx: f64,
    pub pointer_dy: f64,
}

/// Everything the host publishes for one tick.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PbFrame {
    pub head: DevicePose,
    /// Index 0 = right hand, 1 = left hand.
    pub controllers: [DevicePose; 2],
    pub inputs: [ControllerInputs; 2],
    pub cursor_locked: bool,
    /// False while controller tracking is toggled off.
    pub tracking_active: bool,
}

/// `pb_engine_recenter` kind: head-yaw reset plus controller rotation recenter.
pub const PB_RECENTER_HEADING: c_int = 0;
/// `pb_engine_recenter` kind: head position reset plus controller full recenter.
pub const PB_RECENTER_POSITION: c_int = 1;

impl From<PbInput> for InputSnapshot {
    fn from(input: PbInput) -> Self {
        InputSnapshot {
            signals: Signals::from_bits_truncate(input.signals),
            pointer: (input.pointer_dx, input.pointer_dy),
        }
    }
}

impl From<&Frame> for PbFrame {
    fn from(frame: &Frame) -> Self {
        PbFrame {
            head: frame.head,
            controllers: frame.controllers.map(|c| c.pose),
            inputs: frame.controllers.map(|c| c.inputs),
            cursor_locked: frame.cursor_locked,
            tracking_active: frame.tracking_active,
        }
    }
}

unsafe fn optional_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, BridgeError> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|e| BridgeError::Config(format!("argument is not UTF-8: {}", e)))
}

unsafe fn load_config(path: *const c_char) -> Result<BridgeConfig, BridgeError> {
    let path = optional_str(path)?;
    BridgeConfig::load(path.map(Path::new))
}

/// Open (or create) the shared channel.
///
/// `name` overrides the configured channel name; pass NULL to use the
/// configuration. Returns NULL on error (check `pb_last_error()`).
///
/// # Safety
/// `name` must be a valid null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn pb_channel_open(name: *const c_char) -> *mut PbChannel {
    let result = load_config(std::ptr::null()).and_then(|mut config| {
        if let Some(name) = optional_str(name)? {
            config.channel.name = name.to_string();
        }
        config.channel.open()
    });
    match result {
        Ok(channel) => {
            LAST_ERROR.clear();
            Box::into_raw(Box::new(PbChannel(channel)))
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Publish a message into the channel, replacing any unread one.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `channel` must be a valid channel pointer and `text` a valid
/// null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn pb_channel_write(channel: *const PbChannel, text: *const c_char) -> c_int {
    if channel.is_null() || text.is_null() {
        return -1;
    }
    let channel = &*channel;
    let text = CStr::from_ptr(text).to_string_lossy();
    match channel.0.write(&text) {
        Ok(_) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Close a channel handle. The backing region stays in place.
///
/// # Safety
/// `channel` must be a pointer returned by `pb_channel_open`, or null.
#[no_mangle]
pub unsafe extern "C" fn pb_channel_close(channel: *mut PbChannel) {
    if !channel.is_null() {
        drop(Box::from_raw(channel));
    }
}

/// Create a pose engine from the configuration at `config_path`, or from the
/// default lookup when NULL. Returns NULL on error.
///
/// # Safety
/// `config_path` must be a valid null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn pb_engine_new(config_path: *const c_char) -> *mut PbEngine {
    match load_config(config_path) {
        Ok(config) => Box::into_raw(Box::new(PbEngine(PoseEngine::new(config.engine)))),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// `engine` must be a pointer returned by `pb_engine_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn pb_engine_free(engine: *mut PbEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Run one tick: consume the channel's pending message (if any), apply
/// `input` (NULL = nothing held) and write the resulting poses to `out_frame`.
/// A malformed message is skipped and reported through `pb_last_error()`; the
/// tick still completes. Any other tick clears the last error.
/// Returns 1 if a message for a controller was applied, 0 if not, -1 on
/// invalid arguments.
///
/// # Safety
/// `engine` and `out_frame` must be valid pointers. `channel` and `input`
/// must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn pb_engine_tick(
    engine: *mut PbEngine,
    channel: *mut PbChannel,
    input: *const PbInput,
    out_frame: *mut PbFrame,
) -> c_int {
    if engine.is_null() || out_frame.is_null() {
        return -1;
    }
    let engine = &mut *engine;

    let decoded = if channel.is_null() {
        None
    } else {
        (*channel).0.read().map(|text| codec::decode(&text))
    };
    let message = match decoded {
        Some(Err(e)) => {
            log::warn!("{}", e);
            LAST_ERROR.set(&e);
            None
        }
        other => {
            LAST_ERROR.clear();
            other.and_then(Result::ok)
        }
    };
    let applied = message.as_ref().is_some_and(|msg| msg.controller.is_some());

    let input: InputSnapshot = if input.is_null() {
        InputSnapshot::idle()
    } else {
        (*input).into()
    };

    let frame = engine.0.tick(message.as_ref(), &input);
    out_frame.write(PbFrame::from(&frame));
    applied as c_int
}

/// Trigger a calibration outside the per-tick signals.
/// `kind`: `PB_RECENTER_HEADING` or `PB_RECENTER_POSITION`.
/// Returns 0 on success, -1 on an unknown kind or null engine.
///
/// # Safety
/// `engine` must be a valid engine pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn pb_engine_recenter(engine: *mut PbEngine, kind: c_int) -> c_int {
    if engine.is_null() {
        return -1;
    }
    let engine = &mut (*engine).0;
    match kind {
        PB_RECENTER_HEADING => {
            engine.reset_head_yaw();
            for hand in Hand::BOTH {
                engine.recenter_controller_rotation(hand);
            }
        }
        PB_RECENTER_POSITION => {
            engine.reset_position();
            for hand in Hand::BOTH {
                engine.recenter_controller(hand);
            }
        }
        _ => return -1,
    }
    0
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next posebridge API call.
#[no_mangle]
pub extern "C" fn pb_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
