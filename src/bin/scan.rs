use anyhow::Result;
use clap::Parser;
use servo_teleop::scanner::{scan, ScanOptions};
use servo_teleop::{SerialServoPort, ServoPort, DEFAULT_BAUD_RATE};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Ping a range of ids and list the servos that answer
#[derive(Parser, Debug)]
#[command(name = "servo-scan", version)]
struct Args {
    /// Serial port to use
    port: String,
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// First id to ping
    #[arg(long, default_value_t = 0)]
    first: u8,
    /// Last id to ping
    #[arg(long, default_value_t = 20)]
    last: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    println!("Opening {} at {} baud...", args.port, args.baud);
    let mut port = SerialServoPort::open(&args.port, args.baud, Duration::from_millis(50))?;

    println!("Scanning ids {} to {}...", args.first, args.last);
    let options = ScanOptions {
        ids: args.first..=args.last,
        ..ScanOptions::default()
    };
    let found = scan(&mut port, &options).await?;
    port.close()?;

    for id in &found {
        println!("Found servo at id {}", id);
    }
    println!("Total servos found: {}", found.len());
    match found.len() {
        0 => println!("No servos found. Check power and the USB connection."),
        1 => println!("Only one servo found. Check the cable to the next servo."),
        _ => {}
    }
    Ok(())
}
