//! Session configuration, loaded from TOML.
//!
//! ```toml
//! leader_port = "/dev/ttyUSB0"
//! follower_port = "/dev/ttyUSB1"
//! on_write_failure = "abort"
//!
//! [[axes]]
//! leader = 7
//! follower = 1
//! direction = -1
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::commander::MAX_SYNC_DEVICES;
use crate::error::{Result, ServoError};
use crate::instructions::MAX_ID;
use crate::serial_driver::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i8")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    pub fn sign(self) -> i8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Forward),
            -1 => Ok(Direction::Reverse),
            other => Err(format!("direction must be 1 or -1, got {}", other)),
        }
    }
}

/// What the active loop does when a frame cannot be written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteFailurePolicy {
    #[default]
    Abort,
    Continue,
}

/// One leader servo mirrored onto one follower servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisConfig {
    pub leader: u8,
    pub follower: u8,
    #[serde(default)]
    pub direction: Direction,
}

impl AxisConfig {
    pub fn new(leader: u8, follower: u8, direction: Direction) -> AxisConfig {
        AxisConfig {
            leader,
            follower,
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TeleopConfig {
    pub leader_port: String,
    pub follower_port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub loop_delay_ms: u64,
    pub on_write_failure: WriteFailurePolicy,
    pub axes: Vec<AxisConfig>,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        let leaders = [7, 8, 9, 10, 11, 12];
        let followers = [1, 2, 3, 4, 6, 5];
        TeleopConfig {
            leader_port: "/dev/ttyUSB0".to_owned(),
            follower_port: "/dev/ttyUSB1".to_owned(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            loop_delay_ms: 2,
            on_write_failure: WriteFailurePolicy::Abort,
            axes: leaders
                .iter()
                .zip(followers.iter())
                .map(|(&leader, &follower)| AxisConfig::new(leader, follower, Direction::Forward))
                .collect(),
        }
    }
}

impl TeleopConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<TeleopConfig> {
        let content = fs::read_to_string(path).map_err(ServoError::ConfigIo)?;
        TeleopConfig::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<TeleopConfig> {
        let config: TeleopConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }

    pub fn follower_ids(&self) -> Vec<u8> {
        self.axes.iter().map(|axis| axis.follower).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.axes.is_empty() {
            return Err(ServoError::Config("at least one axis is required".to_owned()));
        }
        if self.axes.len() > MAX_SYNC_DEVICES {
            return Err(ServoError::Config(format!(
                "{} axes do not fit one sync write, the limit is {}",
                self.axes.len(),
                MAX_SYNC_DEVICES
            )));
        }
        let mut leaders = HashSet::new();
        let mut followers = HashSet::new();
        for axis in &self.axes {
            for (role, id) in [("leader", axis.leader), ("follower", axis.follower)] {
                if id > MAX_ID {
                    return Err(ServoError::Config(format!(
                        "{} id {:#04x} is not a unicast id",
                        role, id
                    )));
                }
            }
            if !leaders.insert(axis.leader) {
                return Err(ServoError::Config(format!(
                    "leader id {} is used by more than one axis",
                    axis.leader
                )));
            }
            if !followers.insert(axis.follower) {
                return Err(ServoError::Config(format!(
                    "follower id {} is used by more than one axis",
                    axis.follower
                )));
            }
        }
        Ok(())
    }
}
