//! Leader/follower teleoperation for daisy-chained serial bus servos.
//!
//! Frames follow the classic half-duplex servo protocol
//! (`FF FF <id> <len> <instruction> <params..> <checksum>`). The leader arm
//! is sampled one servo at a time and the follower arm is driven with a
//! single sync write per tick.

mod commander;
pub mod config;
mod error;
mod instructions;
pub mod provision;
pub mod registers;
mod sampler;
pub mod scanner;
mod serial_driver;
pub mod teleop;

#[cfg(test)]
mod mock_port;

pub use commander::{goal_position_sync_write, send_sync_write, wrap_target, MAX_SYNC_DEVICES};
pub use config::{AxisConfig, Direction, TeleopConfig, WriteFailurePolicy};
pub use error::{Result, ServoError};
pub use instructions::{
    calc_checksum, Instruction, Opcode, StatusError, SyncCommand, BROADCAST_ID, MAX_ID,
};
pub use sampler::{sample_position, AngularPosition, TICKS_PER_REV};
pub use serial_driver::{
    DecodeError, Frame, SerialServoPort, ServoCodec, ServoPort, DEFAULT_BAUD_RATE,
    DEFAULT_TIMEOUT, HEADER, MAX_PARAMS, MIN_FRAME_LEN,
};
pub use teleop::{DeltaTracker, SessionState, TeleopAxis, TeleopSession, TickReport};
