//! Network-facing half of the bridge.
//!
//! Accepts the phone app on TCP and copies every pose document into the
//! shared channel read by the driver.
//!
//! Usage: posebridge-ingest [config.toml]
//! Runs until terminated.

use posebridge::{BridgeConfig, BridgeError, IngestEvent, IngestServer};
use std::path::PathBuf;

fn main() {
    env_logger::init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match BridgeConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let channel = match config.channel.open() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to open channel: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("Channel '{}' at {}", channel.name(), channel.path().display());

    let server = match IngestServer::start(&config.ingest, channel) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to listen on {}: {}", config.ingest.bind, e);
            std::process::exit(1);
        }
    };

    let mut forwarded: u64 = 0;
    let mut rejected: u64 = 0;

    loop {
        match server.recv_event() {
            Ok(IngestEvent::Listening(addr)) => println!("Listening on {}", addr),
            Ok(IngestEvent::Connected(peer)) => println!("Phone connected: {}", peer),
            Ok(IngestEvent::Disconnected(peer)) => {
                println!(
                    "Phone disconnected: {} ({} forwarded, {} rejected)",
                    peer, forwarded, rejected
                );
                forwarded = 0;
                rejected = 0;
            }
            Ok(IngestEvent::Forwarded { .. }) => forwarded += 1,
            Ok(IngestEvent::Rejected { bytes }) => {
                rejected += 1;
                eprintln!("Dropped oversized message ({} bytes)", bytes);
            }
            Err(BridgeError::IngestStopped) => {
                eprintln!("Ingest thread stopped");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
