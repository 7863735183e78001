//! Simulated bus for tests. Answers position reads and pings the way a
//! servo would and records everything written to it.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, ServoError};
use crate::instructions::Opcode;
use crate::registers::PRESENT_POSITION;
use crate::serial_driver::{Frame, ServoPort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reply {
    Position(u16),
    /// Position reply carrying a non-zero status byte.
    Faulted(u8, u16),
    /// Position reply with a corrupted checksum.
    Garbled(u16),
    Silent,
}

#[derive(Default)]
struct MockBus {
    replies: HashMap<u8, VecDeque<Reply>>,
    ping_ids: HashSet<u8>,
    pending: Vec<u8>,
    written: Vec<Vec<u8>>,
    clears: usize,
    closed: bool,
    fail_writes: bool,
    fail_clears: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MockPort {
    bus: Arc<Mutex<MockBus>>,
}

impl MockPort {
    pub(crate) fn new() -> MockPort {
        MockPort::default()
    }

    fn bus(&self) -> MutexGuard<'_, MockBus> {
        self.bus.lock().unwrap()
    }

    /// Queues replies to successive present position reads of `id`. Once the
    /// queue runs dry the servo stays silent.
    pub(crate) fn script(&self, id: u8, replies: impl IntoIterator<Item = Reply>) {
        self.bus()
            .replies
            .entry(id)
            .or_default()
            .extend(replies);
    }

    pub(crate) fn script_positions(&self, id: u8, positions: impl IntoIterator<Item = u16>) {
        self.script(id, positions.into_iter().map(Reply::Position));
    }

    pub(crate) fn answer_pings(&self, id: u8) {
        self.bus().ping_ids.insert(id);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.bus().fail_writes = fail;
    }

    pub(crate) fn fail_clears(&self, fail: bool) {
        self.bus().fail_clears = fail;
    }

    pub(crate) fn written(&self) -> Vec<Vec<u8>> {
        self.bus().written.clone()
    }

    pub(crate) fn written_frames(&self) -> Vec<Frame> {
        self.written()
            .iter()
            .map(|bytes| Frame::decode(bytes).unwrap())
            .collect()
    }

    pub(crate) fn frames_with(&self, opcode: Opcode) -> Vec<Frame> {
        self.written_frames()
            .into_iter()
            .filter(|frame| frame.opcode() == Some(opcode))
            .collect()
    }

    pub(crate) fn clears(&self) -> usize {
        self.bus().clears
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.bus().closed
    }
}

fn position_reply(id: u8, status: u8, raw: u16) -> Vec<u8> {
    Frame::new(id, status, raw.to_le_bytes().to_vec())
        .unwrap()
        .encode()
}

#[async_trait]
impl ServoPort for MockPort {
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut bus = self.bus();
        if bus.closed {
            return Err(ServoError::PortClosed);
        }
        if bus.fail_writes {
            return Err(ServoError::TransportWrite(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device disconnected",
            )));
        }
        bus.written.push(bytes.to_vec());
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(_) => return Ok(()),
        };
        match frame.opcode() {
            Some(Opcode::ReadRegister) if frame.params() == &[PRESENT_POSITION, 2][..] => {
                let reply = bus
                    .replies
                    .get_mut(&frame.id())
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(Reply::Silent);
                match reply {
                    Reply::Position(raw) => {
                        let reply = position_reply(frame.id(), 0, raw);
                        bus.pending.extend(reply);
                    }
                    Reply::Faulted(status, raw) => {
                        let reply = position_reply(frame.id(), status, raw);
                        bus.pending.extend(reply);
                    }
                    Reply::Garbled(raw) => {
                        let mut reply = position_reply(frame.id(), 0, raw);
                        if let Some(checksum) = reply.last_mut() {
                            *checksum ^= 0x01;
                        }
                        bus.pending.extend(reply);
                    }
                    Reply::Silent => {}
                }
            }
            Some(Opcode::Ping) if bus.ping_ids.contains(&frame.id()) => {
                let reply = Frame::new(frame.id(), 0, vec![]).unwrap().encode();
                bus.pending.extend(reply);
            }
            _ => {}
        }
        Ok(())
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let mut bus = self.bus();
        if bus.closed {
            return Err(ServoError::PortClosed);
        }
        let take = max_len.min(bus.pending.len());
        Ok(bus.pending.drain(..take).collect())
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut bus = self.bus();
        if bus.fail_clears {
            return Err(ServoError::TransportRead(io::Error::new(
                io::ErrorKind::Other,
                "flush rejected",
            )));
        }
        bus.pending.clear();
        bus.clears += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.bus().closed = true;
        Ok(())
    }
}
