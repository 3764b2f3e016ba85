// src/worker.rs - Execution worker: drains the waypoint queue, interpolates each
// segment and paces commits into the joint state store.
//
// With an external axis configured, the auxiliary axis is advanced on every
// sub-step and its samples are packed into the velocity/acceleration slots of
// the outgoing sample (slot = sub-step index); the main joints are only
// recomputed and committed once every `subdivision_factor` sub-steps. Without
// one, every sub-step commits a full position/velocity/acceleration sample.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ControllerConfig;
use crate::controller::Shared;
use crate::interpolation::{InterpolationError, SplineSegment};
use crate::publisher::{JointSample, SampleSink};
use crate::state::JointState;
use crate::time::TimeInterface;
use crate::waypoint::Waypoint;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Waypoint has {actual} joints, controller expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),
    #[error("Non-finite interpolated value for joint {joint} at t={time}")]
    NonFinite { joint: usize, time: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    AwaitingConnection,
    Running,
    ShuttingDown,
}

/// Timing and joint layout, fixed when the worker is spawned.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub tick: Duration,
    pub subdivision_factor: usize,
    pub settling_repeats: usize,
    pub high_water_mark: i64,
    pub connection_poll: Duration,
    pub main_joints: usize,
    pub external_axis: bool,
}

impl From<&ControllerConfig> for WorkerSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            tick: config.tick(),
            subdivision_factor: config.subdivision_factor,
            settling_repeats: config.settling_repeats,
            high_water_mark: config.high_water_mark,
            connection_poll: config.connection_poll_interval(),
            main_joints: config.joint_names.len(),
            external_axis: config.external_axis.is_some(),
        }
    }
}

impl WorkerSettings {
    pub fn dof(&self) -> usize {
        self.main_joints + usize::from(self.external_axis)
    }

    fn external_index(&self) -> Option<usize> {
        self.external_axis.then_some(self.main_joints)
    }

    fn sub_step_secs(&self) -> f64 {
        self.tick.as_secs_f64() / self.subdivision_factor as f64
    }
}

#[derive(Debug)]
struct SegmentState {
    anchor: Option<Waypoint>,
    /// Trajectory time of the next sub-step.
    cursor: f64,
    point_count: usize,
    sub_step: usize,
    intermediate: JointState,
}

impl SegmentState {
    fn restart(&mut self, waypoint: &Waypoint) {
        self.cursor = waypoint.time_from_start();
        self.point_count = 1;
        self.sub_step = 0;
        self.intermediate = JointState::from(waypoint);
    }
}

pub(crate) struct ExecutionWorker {
    shared: Arc<Shared>,
    sink: Arc<dyn SampleSink>,
    clock: Arc<dyn TimeInterface>,
    settings: WorkerSettings,
    segment: SegmentState,
    state: WorkerState,
}

impl ExecutionWorker {
    pub fn new(
        shared: Arc<Shared>,
        sink: Arc<dyn SampleSink>,
        clock: Arc<dyn TimeInterface>,
        settings: WorkerSettings,
    ) -> Self {
        let intermediate = JointState::at_rest(vec![0.0; settings.dof()]);
        Self {
            shared,
            sink,
            clock,
            settings,
            segment: SegmentState {
                anchor: None,
                cursor: 0.0,
                point_count: 0,
                sub_step: 0,
                intermediate,
            },
            state: WorkerState::AwaitingConnection,
        }
    }

    pub fn run(mut self) {
        tracing::info!("Motion worker waiting for controller link");
        while self.state != WorkerState::ShuttingDown {
            self.state = match self.state {
                WorkerState::AwaitingConnection => self.await_connection(),
                WorkerState::Running => self.run_once(),
                WorkerState::ShuttingDown => WorkerState::ShuttingDown,
            };
        }
        tracing::info!("Motion worker shut down");
    }

    fn await_connection(&self) -> WorkerState {
        loop {
            if self.shared.store.shutdown_requested() {
                return WorkerState::ShuttingDown;
            }
            if self.shared.store.link_ready() {
                tracing::info!("Controller link up, starting motion worker");
                return WorkerState::Running;
            }
            self.clock.sleep(self.settings.connection_poll);
        }
    }

    fn run_once(&mut self) -> WorkerState {
        if self.shared.store.shutdown_requested() {
            return WorkerState::ShuttingDown;
        }
        let Some(waypoint) = self.shared.queue.dequeue() else {
            return WorkerState::ShuttingDown;
        };
        let time_from_start = waypoint.time_from_start();
        if let Err(e) = self.process(waypoint) {
            tracing::error!(time_from_start, "Unexpected error executing waypoint: {}", e);
        }
        self.shared.queue.task_done();
        WorkerState::Running
    }

    fn process(&mut self, waypoint: Waypoint) -> Result<(), WorkerError> {
        let expected = self.settings.dof();
        if waypoint.dof() != expected {
            return Err(WorkerError::DimensionMismatch {
                expected,
                actual: waypoint.dof(),
            });
        }
        let result = match self.segment.anchor.take() {
            Some(prev) if waypoint.time_from_start() > prev.time_from_start() => {
                self.segment.point_count += 1;
                self.emit_segment(&prev, &waypoint)
            }
            _ => {
                tracing::debug!(
                    time_from_start = waypoint.time_from_start(),
                    "Anchoring new trajectory"
                );
                self.segment.restart(&waypoint);
                Ok(())
            }
        };
        self.segment.anchor = Some(waypoint);
        result?;

        if self.is_final_point() {
            if let Some(last) = &self.segment.anchor {
                self.settle(last);
            }
        }
        Ok(())
    }

    fn is_final_point(&self) -> bool {
        let progress = self.shared.store.progress();
        progress.fully_enqueued() && self.segment.point_count == progress.declared
    }

    fn emit_segment(&mut self, prev: &Waypoint, cur: &Waypoint) -> Result<(), WorkerError> {
        let segment = SplineSegment::new(prev, cur)?;
        let start = prev.time_from_start();
        let end = cur.time_from_start();
        let step = self.settings.sub_step_secs();
        while self.segment.cursor < end {
            let t = self.segment.cursor - start;
            match self.settings.external_index() {
                Some(axis) => self.advance_external_axis(&segment, axis, t)?,
                None => {
                    let sample = segment.sample(t);
                    ensure_finite(&sample.positions, t)?;
                    ensure_finite(&sample.velocities, t)?;
                    self.segment.intermediate = sample;
                    self.commit(&self.segment.intermediate);
                }
            }
            self.segment.cursor += step;
        }
        Ok(())
    }

    fn advance_external_axis(
        &mut self,
        segment: &SplineSegment<'_>,
        axis: usize,
        t: f64,
    ) -> Result<(), WorkerError> {
        let slot = self.segment.sub_step;
        let position = segment.position(axis, t);
        let velocity = segment.velocity(axis, t);
        ensure_finite(&[position, velocity], t).map_err(|_| WorkerError::NonFinite {
            joint: axis,
            time: t,
        })?;
        let sample = &mut self.segment.intermediate;
        sample.accelerations[slot] = position;
        sample.velocities[slot] = velocity;
        sample.positions[axis] = position;

        self.segment.sub_step += 1;
        if self.segment.sub_step == self.settings.subdivision_factor {
            self.segment.sub_step = 0;
            for joint in 0..axis {
                let p = segment.position(joint, t);
                if !p.is_finite() {
                    return Err(WorkerError::NonFinite { joint, time: t });
                }
                self.segment.intermediate.positions[joint] = p;
            }
            self.commit(&self.segment.intermediate);
        }
        Ok(())
    }

    /// Commits the trajectory's last waypoint directly, then repeats it so
    /// downstream consumers observe a stable terminal state.
    fn settle(&self, last: &Waypoint) {
        let mut terminal = JointState::from(last);
        let mut hold = terminal.clone();
        if let Some(axis) = self.settings.external_index() {
            let parked = last.positions()[axis];
            let filled = self.segment.sub_step;
            for slot in 0..self.settings.subdivision_factor {
                terminal.accelerations[slot] = if slot < filled {
                    self.segment.intermediate.accelerations[slot]
                } else {
                    parked
                };
                hold.accelerations[slot] = parked;
            }
        }
        self.commit(&terminal);
        for _ in 0..self.settings.settling_repeats {
            self.commit(&hold);
        }
        tracing::info!(points = self.segment.point_count, "Trajectory complete");
    }

    fn commit(&self, sample: &JointState) {
        if !self.pace() {
            return;
        }
        if self.shared.store.commit(sample) {
            self.publish(sample);
        } else {
            tracing::info!("Stopping motion immediately, clearing stop signal");
        }
    }

    /// Holds the worker back while the downstream buffer is over the
    /// high-water mark. Returns false if shutdown was requested meanwhile.
    fn pace(&self) -> bool {
        let tick = self.settings.tick;
        let mut throttled = false;
        loop {
            let bp = self.shared.store.backpressure();
            if bp.shutdown_requested {
                return false;
            }
            if bp.buffer_occupancy > self.settings.high_water_mark {
                if !throttled {
                    tracing::debug!(
                        occupancy = bp.buffer_occupancy,
                        "Downstream buffer above high-water mark, throttling"
                    );
                    throttled = true;
                }
                self.clock.sleep(tick);
                continue;
            }
            // Nothing buffered and nobody consuming: idle one tick instead of spinning.
            if bp.buffer_occupancy == 0 && !bp.controller_connected {
                self.clock.sleep(tick);
            }
            return true;
        }
    }

    fn publish(&self, state: &JointState) {
        let stamp: DateTime<Utc> = self.clock.now_wallclock().into();
        if let Err(e) = self.sink.publish(&JointSample::new(stamp, state)) {
            tracing::warn!("Failed to publish joint sample: {}", e);
        }
    }
}

fn ensure_finite(values: &[f64], time: f64) -> Result<(), WorkerError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(joint) => Err(WorkerError::NonFinite { joint, time }),
        None => Ok(()),
    }
}
