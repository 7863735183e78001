use std::ops::RangeInclusive;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::error::Result;
use crate::instructions::{Instruction, BROADCAST_ID};
use crate::serial_driver::{ServoPort, MIN_FRAME_LEN};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub ids: RangeInclusive<u8>,
    /// Wait between a ping and reading its reply.
    pub settle: Duration,
    /// Quiet time after each probe so replies do not collide.
    pub gap: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            ids: 0..=20,
            settle: Duration::from_millis(20),
            gap: Duration::from_millis(20),
        }
    }
}

/// Pings `id` and reports whether it answered with a valid frame.
pub async fn ping<P: ServoPort + ?Sized>(port: &mut P, id: u8, settle: Duration) -> Result<bool> {
    port.clear_input()?;
    port.send(&Instruction::ping(id)).await?;
    sleep(settle).await;
    match port.receive(MIN_FRAME_LEN).await? {
        Some(frame) if frame.id() == id => Ok(true),
        Some(frame) => {
            debug!(id, responder = frame.id(), "ping answered by another id");
            Ok(false)
        }
        None => Ok(false),
    }
}

/// Returns the ids in `options.ids` that answer a ping, in ascending order.
pub async fn scan<P: ServoPort + ?Sized>(port: &mut P, options: &ScanOptions) -> Result<Vec<u8>> {
    let mut found = vec![];
    for id in options.ids.clone() {
        if id == BROADCAST_ID {
            continue;
        }
        if ping(port, id, options.settle).await? {
            info!(id, "found servo");
            found.push(id);
        }
        sleep(options.gap).await;
    }
    info!(count = found.len(), "scan complete");
    Ok(found)
}
