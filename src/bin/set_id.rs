use anyhow::Result;
use clap::Parser;
use servo_teleop::provision::{provision, ProvisionPlan};
use servo_teleop::{SerialServoPort, ServoPort, DEFAULT_BAUD_RATE};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Permanently change the id of a single servo
#[derive(Parser, Debug)]
#[command(name = "servo-set-id", version)]
struct Args {
    /// Serial port to use
    port: String,
    /// Id to write
    new_id: u8,
    /// Id the servo answers to now
    #[arg(long, default_value_t = 1)]
    current_id: u8,
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Voltage limit in tenths of a volt
    #[arg(long, default_value_t = 45)]
    voltage_limit: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut port = SerialServoPort::open(&args.port, args.baud, Duration::from_millis(500))?;
    let plan = ProvisionPlan {
        current_id: args.current_id,
        new_id: args.new_id,
        voltage_limit: args.voltage_limit,
    };
    println!(
        "Rewriting servo {} to id {}. Do not unplug until done.",
        plan.current_id, plan.new_id
    );
    provision(&mut port, &plan).await?;
    port.close()?;
    println!("Done. Power cycle the servo and scan for id {}.", plan.new_id);
    Ok(())
}
