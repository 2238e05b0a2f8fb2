//! # posebridge - phone motion controller to VR runtime bridge
//!
//! Two processes share a small memory-mapped channel:
//! - the ingest process receives JSON pose documents from the phone app over
//!   TCP and writes the newest one into the channel
//! - the driver, loaded into the VR runtime, reads the channel once per frame,
//!   folds the sample into head and controller poses, and publishes them
//!
//! ## Quick Start
//! ```no_run
//! use posebridge::{BridgeConfig, Driver, InputSnapshot, LoopbackHost, PoseEngine};
//!
//! let config = BridgeConfig::load(None).unwrap();
//! let channel = config.channel.open().unwrap();
//! let mut driver = Driver::new(
//!     channel,
//!     PoseEngine::new(config.engine.clone()),
//!     LoopbackHost::new(),
//!     InputSnapshot::idle(),
//! );
//! let frame = driver.run_frame();
//! println!("head: {:?}", frame.head.position);
//! ```

pub mod error;
pub mod types;
pub mod orientation;
pub mod codec;
pub mod channel;
pub mod input;
pub mod engine;
pub mod runtime;
pub mod ingest;
pub mod config;
pub mod ffi;

pub use channel::Channel;
pub use config::BridgeConfig;
pub use engine::{EngineConfig, Frame, PoseEngine};
pub use error::BridgeError;
pub use ingest::{IngestEvent, IngestServer};
pub use input::{InputSnapshot, InputSource};
pub use runtime::{Driver, FrameStats, LoopbackHost, RuntimeHost};
pub use types::*;

/// Result type alias for posebridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
