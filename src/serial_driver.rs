use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Duration, Instant};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::error::{Result, ServoError};
use crate::instructions::{calc_checksum, Instruction, Opcode};

pub const HEADER: u8 = 0xFF;
/// Header, id, length, instruction and checksum with no parameters.
pub const MIN_FRAME_LEN: usize = 6;
/// The length byte counts parameters plus instruction and checksum.
pub const MAX_PARAMS: usize = u8::MAX as usize - 2;

pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("invalid header")]
    BadHeader,
    #[error("invalid length field {0}")]
    BadLength(u8),
    #[error("frame truncated: expected {expected} bytes, got {found}")]
    Truncated { expected: usize, found: usize },
    #[error("checksum error: expected {expected:#04x}, found {found:#04x}")]
    Checksum { expected: u8, found: u8 },
}

/// One frame on the wire: `FF FF <id> <len> <instruction> <params..> <checksum>`.
///
/// In replies the instruction slot carries the servo's status byte.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Frame {
    id: u8,
    instruction: u8,
    params: Vec<u8>,
}

impl Frame {
    pub fn new(id: u8, instruction: u8, params: Vec<u8>) -> Result<Frame> {
        if params.len() > MAX_PARAMS {
            return Err(ServoError::FrameTooLong(params.len()));
        }
        Ok(Frame {
            id,
            instruction,
            params,
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn instruction(&self) -> u8 {
        self.instruction
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.instruction).ok()
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.params.len() + MIN_FRAME_LEN);
        data.extend_from_slice(&[
            HEADER,
            HEADER,
            self.id,
            (self.params.len() + 2) as u8,
            self.instruction,
        ]);
        data.extend_from_slice(&self.params);
        let checksum = calc_checksum(&data[2..]);
        data.push(checksum);
        data
    }

    /// Decodes the frame at the start of `data`. Bytes past its declared
    /// length are ignored.
    pub fn decode(data: &[u8]) -> std::result::Result<Frame, DecodeError> {
        if data.len() < MIN_FRAME_LEN {
            return Err(DecodeError::TooShort(data.len()));
        }
        if data[0] != HEADER || data[1] != HEADER {
            return Err(DecodeError::BadHeader);
        }
        let len = data[3];
        if len < 2 {
            return Err(DecodeError::BadLength(len));
        }
        let end = 4 + len as usize;
        if data.len() < end {
            return Err(DecodeError::Truncated {
                expected: end,
                found: data.len(),
            });
        }
        let expected = calc_checksum(&data[2..end - 1]);
        let found = data[end - 1];
        if expected != found {
            return Err(DecodeError::Checksum { expected, found });
        }
        Ok(Frame {
            id: data[2],
            instruction: data[4],
            params: data[5..end - 1].to_vec(),
        })
    }
}

pub struct ServoCodec;

impl Decoder for ServoCodec {
    type Item = Frame;
    type Error = ServoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < 4 {
            return Ok(None);
        }
        if src[0] != HEADER || src[1] != HEADER {
            return Err(DecodeError::BadHeader.into());
        }
        let len = src[3] as usize;
        if src.len() < 4 + len {
            return Ok(None);
        }
        let message = src.split_to(4 + len);
        Ok(Some(Frame::decode(&message)?))
    }
}

impl<'a> Encoder<&'a Instruction> for ServoCodec {
    type Error = ServoError;

    fn encode(&mut self, data: &'a Instruction, buf: &mut BytesMut) -> Result<()> {
        let msg = data.serialize()?;
        buf.reserve(msg.len());
        buf.put(msg.as_ref());
        Ok(())
    }
}

/// Byte level access to one half-duplex bus.
#[async_trait]
pub trait ServoPort: Send {
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Reads up to `max_len` bytes. Returns fewer once the read timeout
    /// elapses and never waits past it.
    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>>;

    fn clear_input(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    async fn send(&mut self, instruction: &Instruction) -> Result<()> {
        let mut buf = BytesMut::new();
        ServoCodec.encode(instruction, &mut buf)?;
        self.write(&buf).await
    }

    /// Single bounded read of one reply. Silence and garbage both come back
    /// as `None`.
    async fn receive(&mut self, max_len: usize) -> Result<Option<Frame>> {
        let bytes = match self.read(max_len).await {
            Ok(bytes) => bytes,
            Err(ServoError::TransportRead(err)) => {
                trace!(%err, "read failed");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if bytes.is_empty() {
            trace!("no reply within read window");
            return Ok(None);
        }
        let mut buf = BytesMut::from(bytes.as_slice());
        match ServoCodec.decode(&mut buf) {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                trace!(len = bytes.len(), "incomplete reply");
                Ok(None)
            }
            Err(err) => {
                trace!(%err, "discarding malformed reply");
                Ok(None)
            }
        }
    }
}

pub struct SerialServoPort {
    name: String,
    stream: Option<SerialStream>,
    timeout: Duration,
}

impl SerialServoPort {
    pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> Result<SerialServoPort> {
        let stream = tokio_serial::new(port, baud_rate)
            .timeout(timeout)
            .open_native_async()
            .map_err(|source| ServoError::TransportOpen {
                port: port.to_owned(),
                source,
            })?;
        debug!(port, baud_rate, ?timeout, "opened serial port");
        Ok(SerialServoPort {
            name: port.to_owned(),
            stream: Some(stream),
            timeout,
        })
    }

    fn stream(&mut self) -> Result<&mut SerialStream> {
        self.stream.as_mut().ok_or(ServoError::PortClosed)
    }
}

#[async_trait]
impl ServoPort for SerialServoPort {
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream
            .write_all(bytes)
            .await
            .map_err(ServoError::TransportWrite)?;
        stream.flush().await.map_err(ServoError::TransportWrite)?;
        Ok(())
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let stream = self.stream()?;
        let mut buffer = vec![0; max_len];
        let mut filled = 0;
        while filled < max_len {
            match timeout_at(deadline, stream.read(&mut buffer[filled..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(err)) => return Err(ServoError::TransportRead(err)),
                Err(_elapsed) => break,
            }
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    fn clear_input(&mut self) -> Result<()> {
        let stream = self.stream()?;
        <SerialStream as SerialPort>::clear(stream, ClearBuffer::Input)
            .map_err(|err| ServoError::TransportRead(err.into()))
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            debug!(port = %self.name, "closed serial port");
        }
        Ok(())
    }
}
