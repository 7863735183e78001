use anyhow::{Context, Result};
use clap::Parser;
use servo_teleop::{SerialServoPort, TeleopConfig, TeleopSession};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Mirror the motion of a leader arm onto a follower arm
#[derive(Parser, Debug)]
#[command(name = "servo-teleop", version)]
struct Args {
    /// TOML session configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial port of the leader bus, overrides the configuration
    #[arg(long)]
    leader: Option<String>,
    /// Serial port of the follower bus, overrides the configuration
    #[arg(long)]
    follower: Option<String>,
    /// Baud rate of both buses, overrides the configuration
    #[arg(long)]
    baud: Option<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => TeleopConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => TeleopConfig::default(),
    };
    if let Some(leader) = args.leader {
        config.leader_port = leader;
    }
    if let Some(follower) = args.follower {
        config.follower_port = follower;
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    config.validate()?;

    info!(leader = %config.leader_port, follower = %config.follower_port, "opening ports");
    let leader = SerialServoPort::open(&config.leader_port, config.baud_rate, config.read_timeout())?;
    let follower =
        SerialServoPort::open(&config.follower_port, config.baud_rate, config.read_timeout())?;

    let mut session = TeleopSession::new(config, leader, follower);
    if let Err(err) = session.relax().await {
        if let Err(shutdown_err) = session.shutdown().await {
            warn!(err = %shutdown_err, "failed to release servos after relax failure");
        }
        return Err(err).context("failed to relax servos");
    }

    // Torque is off on both arms here, so the default interrupt behavior is safe
    // until the handler below takes over.
    println!("Move both arms to the sync position, then press ENTER.");
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await?
    .context("failed to read from stdin")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping");
                interrupt.cancel();
            }
            Err(err) => warn!(%err, "failed to listen for interrupt"),
        }
    });

    session.run(cancel).await?;
    info!("stopped");
    Ok(())
}
