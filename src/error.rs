use std::fmt;

/// Errors produced by the pose bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Shared channel '{name}' unavailable: {reason}")]
    ChannelUnavailable { name: String, reason: String },

    #[error("Message of {len} bytes exceeds channel slot capacity ({capacity} bytes)")]
    MessageTooLarge { len: usize, capacity: usize },

    #[error("Malformed pose message: {0}")]
    MalformedMessage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ingest thread stopped")]
    IngestStopped,

    #[error("Timeout waiting for data")]
    Timeout,
}

impl BridgeError {
    pub(crate) fn channel(name: &str, reason: impl fmt::Display) -> Self {
        BridgeError::ChannelUnavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &BridgeError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
