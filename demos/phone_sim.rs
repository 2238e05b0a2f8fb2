//! Synthetic phone client: sends a slowly turning right controller.
//!
//! Usage: cargo run --example phone_sim [host:port]
//! Defaults to 127.0.0.1:27015.

use serde_json::json;
use std::io::Write as _;
use std::net::TcpStream;
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:27015".to_string());
    let mut stream = match TcpStream::connect(&addr) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to connect to {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    stream.set_nodelay(true).ok();
    println!("Connected to {}", addr);

    let start = Instant::now();
    let mut sent: u64 = 0;

    loop {
        let t = start.elapsed().as_secs_f64();
        // Wire rotation is [yaw, pitch, roll] in degrees, wrapped like a phone sensor.
        let yaw = (t * 30.0) % 360.0;
        let pitch = 10.0 * (t * 0.5).sin();
        let trigger = if (t as u64) % 4 == 0 { 1.0 } else { 0.0 };

        let msg = json!({
            "id": 0,
            "translation": [0.05 * t.sin(), 0.0, -0.05 * t.cos()],
            "rotation": [yaw, pitch, 0.0],
            "trackpad": [0.0, 0.0],
            "clicked": false,
            "trigger": trigger,
        });

        let mut line = msg.to_string();
        line.push('\n');
        if let Err(e) = stream.write_all(line.as_bytes()) {
            eprintln!("Send failed: {}", e);
            break;
        }

        sent += 1;
        if sent % 200 == 0 {
            println!("--- {} messages in {:.1}s ---", sent, t);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
