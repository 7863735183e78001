use std::io;
use thiserror::Error;

use crate::serial_driver::DecodeError;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServoError {
    #[error("failed to open serial port {port}: {source}")]
    TransportOpen {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("failed to write to serial port: {0}")]
    TransportWrite(#[source] io::Error),
    #[error("failed to read from serial port: {0}")]
    TransportRead(#[source] io::Error),
    #[error("serial port is closed")]
    PortClosed,
    #[error("malformed frame: {0}")]
    Malformed(#[from] DecodeError),
    #[error("frame parameters too long: {0} bytes")]
    FrameTooLong(usize),
    #[error("sync write got {ids} ids but {targets} targets")]
    SyncLengthMismatch { ids: usize, targets: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read configuration file: {0}")]
    ConfigIo(#[source] io::Error),
    #[error("failed to parse configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// Required by the codec traits.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServoError {
    /// Write failures are the only errors a running session has to react to.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, ServoError::TransportWrite(_) | ServoError::PortClosed)
    }
}

pub type Result<T> = std::result::Result<T, ServoError>;
