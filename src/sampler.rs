use tracing::{debug, trace};

use crate::error::Result;
use crate::instructions::{Instruction, StatusError};
use crate::registers::PRESENT_POSITION;
use crate::serial_driver::{ServoPort, MIN_FRAME_LEN};

/// Ticks in one mechanical revolution.
pub const TICKS_PER_REV: u16 = 4096;
const HALF_REV: i32 = TICKS_PER_REV as i32 / 2;

const POSITION_WIDTH: u8 = 2;
const POSITION_REPLY_LEN: usize = MIN_FRAME_LEN + POSITION_WIDTH as usize;

/// Position within a single revolution, always in `0..4096`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AngularPosition(u16);

impl AngularPosition {
    /// Drops any multi-turn information the sensor encodes.
    pub fn from_raw(raw: u16) -> AngularPosition {
        AngularPosition(raw % TICKS_PER_REV)
    }

    pub fn ticks(self) -> u16 {
        self.0
    }

    /// Signed shortest path from `previous` to `self` across the 0/4096 seam.
    pub fn delta_from(self, previous: AngularPosition) -> i32 {
        let mut delta = i32::from(self.0) - i32::from(previous.0);
        if delta > HALF_REV {
            delta -= i32::from(TICKS_PER_REV);
        }
        if delta < -HALF_REV {
            delta += i32::from(TICKS_PER_REV);
        }
        delta
    }
}

/// One attempt at reading the present position of `id`.
///
/// A missing, short or corrupt reply is `Ok(None)`; the caller is expected to
/// skip the servo for this tick rather than retry. Only failing to send the
/// request is an error.
pub async fn sample_position<P: ServoPort + ?Sized>(
    port: &mut P,
    id: u8,
) -> Result<Option<AngularPosition>> {
    // a late reply to an earlier request would be read as ours
    if let Err(err) = port.clear_input() {
        debug!(id, %err, "failed to clear input buffer");
    }
    port.send(&Instruction::read(id, PRESENT_POSITION, POSITION_WIDTH))
        .await?;
    let frame = match port.receive(POSITION_REPLY_LEN).await? {
        Some(frame) => frame,
        None => {
            trace!(id, "missed position sample");
            return Ok(None);
        }
    };
    if frame.id() != id {
        trace!(id, responder = frame.id(), "reply from wrong servo");
        return Ok(None);
    }
    if let Some(status) = StatusError::from_flag(frame.instruction()) {
        debug!(id, %status, "servo reported error status");
    }
    match frame.params() {
        [low, high] => {
            let raw = u16::from_le_bytes([*low, *high]);
            Ok(Some(AngularPosition::from_raw(raw)))
        }
        params => {
            trace!(id, len = params.len(), "unexpected position reply length");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServoError;
    use crate::instructions::Opcode;
    use crate::mock_port::{MockPort, Reply};

    #[test]
    fn raw_readings_are_reduced_to_one_revolution() {
        assert_eq!(AngularPosition::from_raw(0).ticks(), 0);
        assert_eq!(AngularPosition::from_raw(4095).ticks(), 4095);
        assert_eq!(AngularPosition::from_raw(4096).ticks(), 0);
        assert_eq!(AngularPosition::from_raw(4101).ticks(), 5);
        assert_eq!(AngularPosition::from_raw(u16::MAX).ticks(), 4095);
    }

    #[test]
    fn delta_takes_shortest_path_across_seam() {
        let previous = AngularPosition::from_raw(4090);
        let current = AngularPosition::from_raw(4101);
        assert_eq!(current.delta_from(previous), 11);
        assert_eq!(previous.delta_from(current), -11);
    }

    #[test]
    fn delta_inside_revolution_is_plain_difference() {
        let a = AngularPosition::from_raw(10);
        let b = AngularPosition::from_raw(20);
        assert_eq!(b.delta_from(a), 10);
        assert_eq!(a.delta_from(b), -10);
        assert_eq!(a.delta_from(a), 0);
    }

    #[test]
    fn half_revolution_is_not_corrected() {
        let a = AngularPosition::from_raw(0);
        let b = AngularPosition::from_raw(2048);
        assert_eq!(b.delta_from(a), 2048);
        assert_eq!(a.delta_from(b), -2048);
        let c = AngularPosition::from_raw(2049);
        assert_eq!(c.delta_from(a), -2047);
    }

    #[tokio::test]
    async fn sample_reads_present_position() {
        let mut port = MockPort::new();
        port.script_positions(3, [0x0123]);
        let position = sample_position(&mut port, 3).await.unwrap();
        assert_eq!(position, Some(AngularPosition::from_raw(0x0123)));
        assert_eq!(
            port.written(),
            vec![vec![0xFF, 0xFF, 0x03, 0x04, 0x02, 0x38, 0x02, 0xBC]]
        );
        assert_eq!(port.clears(), 1);
    }

    #[tokio::test]
    async fn sample_normalizes_multi_turn_reading() {
        let mut port = MockPort::new();
        port.script_positions(1, [4101]);
        let position = sample_position(&mut port, 1).await.unwrap();
        assert_eq!(position.map(AngularPosition::ticks), Some(5));
    }

    #[tokio::test]
    async fn silent_servo_is_a_miss() {
        let mut port = MockPort::new();
        port.script(1, [Reply::Silent]);
        assert_eq!(sample_position(&mut port, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn garbled_reply_is_a_miss() {
        let mut port = MockPort::new();
        port.script(1, [Reply::Garbled(100)]);
        assert_eq!(sample_position(&mut port, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn faulted_reply_still_yields_position() {
        let mut port = MockPort::new();
        port.script(1, [Reply::Faulted(0b0010_0000, 900)]);
        let position = sample_position(&mut port, 1).await.unwrap();
        assert_eq!(position.map(AngularPosition::ticks), Some(900));
    }

    #[tokio::test]
    async fn stale_bytes_are_discarded_before_request() {
        let mut port = MockPort::new();
        port.script_positions(1, [111]);
        port.script_positions(2, [222]);
        // request servo 1 but never consume its reply
        port.send(&Instruction::read(1, PRESENT_POSITION, 2))
            .await
            .unwrap();
        let position = sample_position(&mut port, 2).await.unwrap();
        assert_eq!(position.map(AngularPosition::ticks), Some(222));
    }

    #[tokio::test]
    async fn one_request_per_sample() {
        let mut port = MockPort::new();
        port.script(1, [Reply::Silent, Reply::Position(5)]);
        assert_eq!(sample_position(&mut port, 1).await.unwrap(), None);
        assert_eq!(port.frames_with(Opcode::ReadRegister).len(), 1);
    }

    #[tokio::test]
    async fn failed_clear_still_samples() {
        let mut port = MockPort::new();
        port.script_positions(4, [321]);
        port.fail_clears(true);
        let position = sample_position(&mut port, 4).await.unwrap();
        assert_eq!(position.map(AngularPosition::ticks), Some(321));
        assert_eq!(port.frames_with(Opcode::ReadRegister).len(), 1);
        assert_eq!(port.clears(), 0);
    }

    #[tokio::test]
    async fn failed_request_write_is_an_error() {
        let mut port = MockPort::new();
        port.fail_writes(true);
        let err = sample_position(&mut port, 1).await.unwrap_err();
        assert!(matches!(err, ServoError::TransportWrite(_)));
    }
}
