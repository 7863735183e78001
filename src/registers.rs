//! Control table offsets used by this crate.

// EEPROM table
pub const ID: u8 = 5;
pub const MAX_VOLTAGE_LIMIT: u8 = 11;
/// EEPROM write lock on STS series servos.
pub const LOCK_STS: u8 = 48;
/// EEPROM write lock on SCS series servos.
pub const LOCK_SCS: u8 = 55;

// RAM table
pub const TORQUE_ENABLE: u8 = 40;
/// Two bytes, little endian.
pub const GOAL_POSITION: u8 = 42;
/// Two bytes, little endian.
pub const PRESENT_POSITION: u8 = 56;
