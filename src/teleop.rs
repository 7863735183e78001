//! Leader/follower mirroring.
//!
//! Every tick samples each leader servo once, turns the movement since the
//! last accepted sample into a signed delta and adds it to that axis'
//! follower target. When any axis moved, one sync write carries the targets
//! of all followers. Followers never see absolute leader positions, only
//! accumulated deltas, so follower targets may run past one revolution.

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::commander::send_sync_write;
use crate::config::{AxisConfig, Direction, TeleopConfig, WriteFailurePolicy};
use crate::error::{Result, ServoError};
use crate::instructions::Instruction;
use crate::registers::TORQUE_ENABLE;
use crate::sampler::{sample_position, AngularPosition};
use crate::serial_driver::ServoPort;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeleopAxis {
    leader_id: u8,
    follower_id: u8,
    direction: Direction,
    last_leader: AngularPosition,
    target: i64,
}

impl TeleopAxis {
    pub fn new(config: &AxisConfig) -> TeleopAxis {
        TeleopAxis {
            leader_id: config.leader,
            follower_id: config.follower,
            direction: config.direction,
            last_leader: AngularPosition::default(),
            target: 0,
        }
    }

    pub fn leader_id(&self) -> u8 {
        self.leader_id
    }

    pub fn follower_id(&self) -> u8 {
        self.follower_id
    }

    pub fn last_leader(&self) -> AngularPosition {
        self.last_leader
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    fn lock(&mut self, leader: AngularPosition, follower: AngularPosition) {
        self.last_leader = leader;
        self.target = i64::from(follower.ticks());
    }

    /// Returns true when the follower target changed.
    pub fn observe(&mut self, current: AngularPosition) -> bool {
        let delta = current.delta_from(self.last_leader);
        if delta == 0 {
            // baseline is left as is on a zero delta
            return false;
        }
        self.last_leader = current;
        self.target += i64::from(delta) * i64::from(self.direction.sign());
        true
    }
}

/// Owns the per-axis state of a session.
#[derive(Debug, Clone)]
pub struct DeltaTracker {
    axes: Vec<TeleopAxis>,
    follower_ids: Vec<u8>,
}

impl DeltaTracker {
    pub fn new(axes: &[AxisConfig]) -> DeltaTracker {
        DeltaTracker {
            axes: axes.iter().map(TeleopAxis::new).collect(),
            follower_ids: axes.iter().map(|axis| axis.follower).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn axes(&self) -> &[TeleopAxis] {
        &self.axes
    }

    pub fn follower_ids(&self) -> &[u8] {
        &self.follower_ids
    }

    pub fn targets(&self) -> Vec<i64> {
        self.axes.iter().map(TeleopAxis::target).collect()
    }

    /// Sets the starting point of an axis: the leader baseline and the
    /// follower's current position as its target.
    pub fn lock_axis(&mut self, index: usize, leader: AngularPosition, follower: AngularPosition) {
        self.axes[index].lock(leader, follower);
    }

    /// Feeds one leader sample. A missed sample leaves the axis untouched.
    pub fn observe(&mut self, index: usize, sample: Option<AngularPosition>) -> bool {
        match sample {
            Some(position) => self.axes[index].observe(position),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Relaxing,
    Locking,
    Active,
    Stopped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sampled: usize,
    pub missed: usize,
    pub dirty: usize,
    pub sent: bool,
}

pub struct TeleopSession<L, F> {
    config: TeleopConfig,
    leader: L,
    follower: F,
    tracker: DeltaTracker,
    state: SessionState,
    /// Targets moved since the last sync write that reached the bus.
    unsent: bool,
}

impl<L: ServoPort, F: ServoPort> TeleopSession<L, F> {
    pub fn new(config: TeleopConfig, leader: L, follower: F) -> TeleopSession<L, F> {
        let tracker = DeltaTracker::new(&config.axes);
        TeleopSession {
            config,
            leader,
            follower,
            tracker,
            state: SessionState::Relaxing,
            unsent: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tracker(&self) -> &DeltaTracker {
        &self.tracker
    }

    fn transition(&mut self, state: SessionState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, "session state");
            self.state = state;
        }
    }

    /// Disables holding torque on both arms so they can be posed by hand.
    pub async fn relax(&mut self) -> Result<()> {
        self.transition(SessionState::Relaxing);
        for axis in self.tracker.axes() {
            self.leader
                .send(&Instruction::write_u8(axis.leader_id(), TORQUE_ENABLE, 0))
                .await?;
        }
        for axis in self.tracker.axes() {
            self.follower
                .send(&Instruction::write_u8(axis.follower_id(), TORQUE_ENABLE, 0))
                .await?;
        }
        Ok(())
    }

    /// Reads the starting position of every axis, stiffens the followers
    /// where they stand and sends the first sync write. Returns false when
    /// cancelled before all axes were acquired.
    pub async fn lock(&mut self, cancel: &CancellationToken) -> Result<bool> {
        self.transition(SessionState::Locking);
        for index in 0..self.tracker.len() {
            let axis = &self.tracker.axes()[index];
            let (leader_id, follower_id) = (axis.leader_id(), axis.follower_id());
            let leader = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                position = acquire_position(&mut self.leader, leader_id) => position?,
            };
            let follower = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                position = acquire_position(&mut self.follower, follower_id) => position?,
            };
            self.tracker.lock_axis(index, leader, follower);
            self.follower
                .send(&Instruction::write_u8(follower_id, TORQUE_ENABLE, 1))
                .await?;
            debug!(
                leader_id,
                follower_id,
                leader = leader.ticks(),
                follower = follower.ticks(),
                "axis locked"
            );
        }
        send_sync_write(
            &mut self.follower,
            self.tracker.follower_ids(),
            &self.tracker.targets(),
        )
        .await?;
        Ok(true)
    }

    /// One pass over all axes followed by at most one sync write. Targets a
    /// failed tick could not deliver are sent again on the next tick.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();
        for index in 0..self.tracker.len() {
            let leader_id = self.tracker.axes()[index].leader_id();
            let sample = sample_position(&mut self.leader, leader_id).await?;
            match sample {
                Some(_) => report.sampled += 1,
                None => report.missed += 1,
            }
            if self.tracker.observe(index, sample) {
                report.dirty += 1;
                self.unsent = true;
            }
        }
        if self.unsent {
            send_sync_write(
                &mut self.follower,
                self.tracker.follower_ids(),
                &self.tracker.targets(),
            )
            .await?;
            self.unsent = false;
            report.sent = true;
        }
        trace!(?report, "tick");
        Ok(report)
    }

    /// Locks, mirrors until `cancel` fires and then stops, releasing the
    /// followers and closing both ports whatever the exit path.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let outcome = self.drive(&cancel).await;
        let stopped = self.shutdown().await;
        outcome.and(stopped)
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<()> {
        if !self.lock(cancel).await? {
            info!("cancelled while locking");
            return Ok(());
        }
        self.transition(SessionState::Active);
        let pace = self.config.loop_delay();
        loop {
            if let Err(err) = self.tick().await {
                if !err.is_write_failure() || self.config.on_write_failure == WriteFailurePolicy::Abort {
                    error!(%err, "tick failed, stopping");
                    return Err(err);
                }
                warn!(%err, "tick failed, continuing");
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(pace) => {}
            }
        }
        Ok(())
    }

    /// Releases every follower and closes both ports. Every follower is
    /// attempted even if some writes fail; the first failure is returned.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        let mut first_error: Option<ServoError> = None;
        for &id in self.tracker.follower_ids() {
            if let Err(err) = self
                .follower
                .send(&Instruction::write_u8(id, TORQUE_ENABLE, 0))
                .await
            {
                warn!(id, %err, "failed to release follower");
                first_error.get_or_insert(err);
            }
        }
        for result in [self.leader.close(), self.follower.close()] {
            if let Err(err) = result {
                warn!(%err, "failed to close port");
                first_error.get_or_insert(err);
            }
        }
        self.transition(SessionState::Stopped);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn acquire_position<P: ServoPort>(port: &mut P, id: u8) -> Result<AngularPosition> {
    let mut attempts: u32 = 0;
    loop {
        if let Some(position) = sample_position(port, id).await? {
            return Ok(position);
        }
        attempts += 1;
        debug!(id, attempts, "no position yet, retrying");
        tokio::task::yield_now().await;
    }
}
