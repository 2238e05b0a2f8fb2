//! Consumer side of the channel with a headless host.
//!
//! Runs the driver at ~90 Hz against `LoopbackHost` and prints the published
//! poses. Start `posebridge-ingest` and `phone_sim` alongside it.
//!
//! Usage: cargo run --example monitor
//! Press Ctrl+C to stop.

use posebridge::{BridgeConfig, DeviceId, Driver, Hand, InputSnapshot, LoopbackHost, PoseEngine};
use std::time::{Duration, Instant};

const FRAME_TIME: Duration = Duration::from_micros(11_111);

fn main() {
    env_logger::init();

    let config = match BridgeConfig::load(None) {
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
    println!("Channel: {}", channel.path().display());
    println!();

    let mut driver = Driver::new(
        channel,
        PoseEngine::new(config.engine.clone()),
        LoopbackHost::new(),
        InputSnapshot::idle(),
    );

    let start = Instant::now();
    let mut last_report = Instant::now();
    let mut last_messages = 0;

    loop {
        let tick = Instant::now();
        driver.run_frame();
        let stats = driver.stats();

        // Print only when a new message arrived to avoid flooding the terminal
        if stats.messages != last_messages {
            last_messages = stats.messages;
            for hand in Hand::BOTH {
                let Some(p) = driver.host().pose(hand.device()) else {
                    continue;
                };
                let inputs = driver.host().inputs(hand);
                println!(
                    "{:<5?} pos=[{:+.3}, {:+.3}, {:+.3}]  quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]  trigger={:.2}",
                    hand,
                    p.position[0], p.position[1], p.position[2],
                    p.rotation.w, p.rotation.x, p.rotation.y, p.rotation.z,
                    inputs.trigger_value,
                );
            }
        }

        let now = Instant::now();
        if now.duration_since(last_report) >= Duration::from_secs(3) {
            let elapsed = start.elapsed().as_secs_f64();
            let head = driver
                .host()
                .pose(DeviceId::Head)
                .map(|p| p.position)
                .unwrap_or_default();
            println!(
                "--- {} frames, {} messages, {} malformed in {:.1}s  head=[{:+.3}, {:+.3}, {:+.3}] ---",
                stats.frames, stats.messages, stats.malformed, elapsed, head[0], head[1], head[2],
            );
            last_report = now;
        }

        if let Some(rest) = FRAME_TIME.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}
