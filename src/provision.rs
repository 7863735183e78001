//! One-shot rewrite of a servo id.
//!
//! Unlocks the EEPROM, writes the new id and a voltage limit, then locks the
//! EEPROM again under both the old and the new id, since the servo may
//! already answer to either. Nothing is read back.

use tokio::time::{sleep, Duration};
use tracing::info;

use crate::error::{Result, ServoError};
use crate::instructions::{Instruction, MAX_ID};
use crate::registers::{ID, LOCK_SCS, LOCK_STS, MAX_VOLTAGE_LIMIT, TORQUE_ENABLE};
use crate::serial_driver::ServoPort;

const WRITE_SETTLE: Duration = Duration::from_millis(50);
const LOCK_SETTLE: Duration = Duration::from_millis(100);
const FLASH_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub current_id: u8,
    pub new_id: u8,
    /// Tenths of a volt.
    pub voltage_limit: u8,
}

impl ProvisionPlan {
    /// Factory fresh servos answer to id 1.
    pub fn new(new_id: u8) -> ProvisionPlan {
        ProvisionPlan {
            current_id: 1,
            new_id,
            voltage_limit: 45,
        }
    }

    fn validate(&self) -> Result<()> {
        for (role, id) in [("current", self.current_id), ("new", self.new_id)] {
            if id > MAX_ID {
                return Err(ServoError::Config(format!(
                    "{} id {:#04x} is not a unicast id",
                    role, id
                )));
            }
        }
        Ok(())
    }

    fn relock_ids(&self) -> Vec<u8> {
        if self.current_id == self.new_id {
            vec![self.current_id]
        } else {
            vec![self.current_id, self.new_id]
        }
    }
}

async fn write_settled<P: ServoPort + ?Sized>(port: &mut P, id: u8, addr: u8, value: u8) -> Result<()> {
    port.send(&Instruction::write_u8(id, addr, value)).await?;
    sleep(WRITE_SETTLE).await;
    Ok(())
}

pub async fn provision<P: ServoPort + ?Sized>(port: &mut P, plan: &ProvisionPlan) -> Result<()> {
    plan.validate()?;
    let id = plan.current_id;

    info!(id, "unlocking EEPROM");
    write_settled(port, id, LOCK_STS, 0).await?;
    write_settled(port, id, LOCK_SCS, 0).await?;

    info!(id, "disabling torque");
    write_settled(port, id, TORQUE_ENABLE, 0).await?;

    info!(id, limit = plan.voltage_limit, "writing voltage limit");
    write_settled(port, id, MAX_VOLTAGE_LIMIT, plan.voltage_limit).await?;

    info!(id, new_id = plan.new_id, "writing new id");
    write_settled(port, id, ID, plan.new_id).await?;

    for target in plan.relock_ids() {
        info!(id = target, "locking EEPROM");
        write_settled(port, target, LOCK_STS, 1).await?;
        sleep(LOCK_SETTLE).await;
        write_settled(port, target, LOCK_SCS, 1).await?;
        sleep(LOCK_SETTLE).await;
    }

    // flash write cycle
    sleep(FLASH_SETTLE).await;
    Ok(())
}
