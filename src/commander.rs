use tracing::trace;

use crate::error::{Result, ServoError};
use crate::instructions::Instruction;
use crate::registers::GOAL_POSITION;
use crate::serial_driver::{ServoPort, MAX_PARAMS};

const POSITION_WIDTH: u8 = 2;

/// Most devices one goal position sync write can carry.
pub const MAX_SYNC_DEVICES: usize = (MAX_PARAMS - 2) / (POSITION_WIDTH as usize + 1);

/// Wraps an accumulated target onto the 16 bit register.
///
/// Negative and multi-turn targets land on their value modulo 65536, which
/// servos in continuous rotation read as the matching relative move.
pub fn wrap_target(target: i64) -> u16 {
    target.rem_euclid(1 << 16) as u16
}

pub fn goal_position_sync_write(ids: &[u8], targets: &[i64]) -> Result<Instruction> {
    if ids.len() != targets.len() {
        return Err(ServoError::SyncLengthMismatch {
            ids: ids.len(),
            targets: targets.len(),
        });
    }
    let commands: Vec<(u8, u32)> = ids
        .iter()
        .zip(targets)
        .map(|(&id, &target)| (id, u32::from(wrap_target(target))))
        .collect();
    Ok(Instruction::sync_write(GOAL_POSITION, POSITION_WIDTH, commands))
}

/// Moves every servo in `ids` to the matching entry of `targets` with a
/// single broadcast frame. Nothing is read back.
pub async fn send_sync_write<P: ServoPort + ?Sized>(
    port: &mut P,
    ids: &[u8],
    targets: &[i64],
) -> Result<()> {
    let instruction = goal_position_sync_write(ids, targets)?;
    port.send(&instruction).await?;
    trace!(?ids, ?targets, "sent goal position sync write");
    Ok(())
}
