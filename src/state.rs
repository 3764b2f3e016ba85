// src/state.rs - Shared joint state, control flags and backpressure inputs
//
// Everything here lives behind a single mutex. Critical sections are kept to
// one read or one write; nothing sleeps or waits on the queue while holding it.
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::waypoint::Waypoint;

/// Position, velocity and acceleration per joint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointState {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
}

impl JointState {
    pub fn at_rest(positions: Vec<f64>) -> Self {
        let zeros = vec![0.0; positions.len()];
        Self {
            positions,
            velocities: zeros.clone(),
            accelerations: zeros,
        }
    }

    pub fn dof(&self) -> usize {
        self.positions.len()
    }
}

impl From<&Waypoint> for JointState {
    fn from(waypoint: &Waypoint) -> Self {
        Self {
            positions: waypoint.positions().to_vec(),
            velocities: waypoint.velocities().to_vec(),
            accelerations: waypoint.accelerations().to_vec(),
        }
    }
}

/// How much of the current trajectory the ingestion side has declared and queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrajectoryProgress {
    pub declared: usize,
    pub enqueued: usize,
}

impl TrajectoryProgress {
    pub fn fully_enqueued(&self) -> bool {
        self.declared > 0 && self.enqueued == self.declared
    }
}

/// Inputs read by the worker's pacing logic, captured in one lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backpressure {
    pub buffer_occupancy: i64,
    pub controller_connected: bool,
    pub shutdown_requested: bool,
}

#[derive(Debug)]
pub(crate) struct ControllerState {
    pub joints: JointState,
    pub stop_requested: bool,
    pub shutdown_requested: bool,
    pub buffer_occupancy: i64,
    pub controller_connected: bool,
    pub link_ready: bool,
    pub progress: TrajectoryProgress,
}

/// Lock-protected "current" joint state plus the flags that must change
/// atomically with it. Readers always get a copy, never a live reference.
#[derive(Debug)]
pub struct JointStateStore {
    inner: Mutex<ControllerState>,
}

impl JointStateStore {
    pub fn new(initial: JointState, link_ready: bool) -> Self {
        Self {
            inner: Mutex::new(ControllerState {
                joints: initial,
                stop_requested: false,
                shutdown_requested: false,
                buffer_occupancy: 0,
                controller_connected: true,
                link_ready,
                progress: TrajectoryProgress::default(),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self) -> JointState {
        self.lock().joints.clone()
    }

    pub fn positions(&self) -> Vec<f64> {
        self.lock().joints.positions.clone()
    }

    /// Applies a worker sample unless a stop is pending. A pending stop is
    /// consumed instead and the sample dropped. Returns whether it was applied.
    pub fn commit(&self, sample: &JointState) -> bool {
        let mut state = self.lock();
        if state.stop_requested {
            state.stop_requested = false;
            return false;
        }
        state.joints.clone_from(sample);
        true
    }

    /// Overwrites positions from an external pose feed, but only while
    /// `in_motion` reports false. `in_motion` is evaluated under the lock.
    pub fn update_from_feedback(&self, positions: &[f64], in_motion: impl FnOnce() -> bool) -> bool {
        let mut state = self.lock();
        if in_motion() {
            return false;
        }
        state.joints.positions.clear();
        state.joints.positions.extend_from_slice(positions);
        true
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    pub fn request_shutdown(&self) {
        self.lock().shutdown_requested = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.lock().shutdown_requested
    }

    pub fn set_buffer_occupancy(&self, occupancy: i64) {
        self.lock().buffer_occupancy = occupancy;
    }

    pub fn set_controller_connected(&self, connected: bool) {
        self.lock().controller_connected = connected;
    }

    pub fn backpressure(&self) -> Backpressure {
        let state = self.lock();
        Backpressure {
            buffer_occupancy: state.buffer_occupancy,
            controller_connected: state.controller_connected,
            shutdown_requested: state.shutdown_requested,
        }
    }

    pub fn set_link_ready(&self, ready: bool) {
        self.lock().link_ready = ready;
    }

    pub fn link_ready(&self) -> bool {
        self.lock().link_ready
    }

    pub fn begin_trajectory(&self, declared: usize) {
        self.lock().progress = TrajectoryProgress {
            declared,
            enqueued: 0,
        };
    }

    pub(crate) fn reserve_enqueue(&self) {
        self.lock().progress.enqueued += 1;
    }

    pub(crate) fn release_enqueue(&self) {
        let mut state = self.lock();
        state.progress.enqueued = state.progress.enqueued.saturating_sub(1);
    }

    pub fn progress(&self) -> TrajectoryProgress {
        self.lock().progress
    }
}
