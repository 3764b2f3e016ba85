// src/controller.rs - Motion controller façade
//
// Owns the waypoint queue, the joint state store and the execution worker
// thread. Every method is callable from any thread.
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;

use crate::config::ControllerConfig;
use crate::publisher::SampleSink;
use crate::queue::{QueueError, WaypointQueue};
use crate::state::{JointState, JointStateStore, TrajectoryProgress};
use crate::time::TimeInterface;
use crate::waypoint::{Waypoint, WaypointError};
use crate::worker::{ExecutionWorker, WorkerSettings};

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Invalid waypoint: {0}")]
    Waypoint(#[from] WaypointError),
    #[error("Expected {expected} joint values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Failed to spawn motion worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Invalid controller configuration: {0}")]
    Config(String),
}

/// State shared between the façade and the worker thread.
#[derive(Debug)]
pub(crate) struct Shared {
    pub store: JointStateStore,
    pub queue: WaypointQueue,
}

/// Ties enqueued waypoints to the trajectory declared by `begin_trajectory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryHandle {
    generation: u64,
}

pub struct MotionController {
    shared: Arc<Shared>,
    joint_names: Vec<String>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MotionController {
    /// Validates `config`, seeds the joint state and starts the worker thread.
    /// The worker idles in its connection wait until the link is marked ready,
    /// unless `start_connected` is set.
    pub fn spawn(
        config: &ControllerConfig,
        sink: Arc<dyn SampleSink>,
        clock: Arc<dyn TimeInterface>,
    ) -> Result<Self, MotionError> {
        config.validate().map_err(MotionError::Config)?;
        let initial = JointState::at_rest(config.initial_positions());
        let shared = Arc::new(Shared {
            store: JointStateStore::new(initial, config.start_connected),
            queue: WaypointQueue::new(config.queue_capacity(), config.overflow),
        });
        let worker = ExecutionWorker::new(
            Arc::clone(&shared),
            sink,
            clock,
            WorkerSettings::from(config),
        );
        let handle = std::thread::Builder::new()
            .name("motion-worker".to_string())
            .spawn(move || worker.run())
            .map_err(MotionError::Spawn)?;
        tracing::info!(
            dof = config.dof(),
            rate_hz = config.update_rate_hz,
            "Motion controller started"
        );
        Ok(Self {
            shared,
            joint_names: config.controller_joint_names(),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Controller joint order, external axis last.
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    pub fn dof(&self) -> usize {
        self.joint_names.len()
    }

    /// Declares the number of points in the trajectory about to be enqueued.
    /// The worker settles on the point whose count matches it.
    ///
    /// Waypoints added through the returned handle are refused once `stop`
    /// has cleared the queue.
    pub fn begin_trajectory(&self, total_points: usize) -> TrajectoryHandle {
        let generation = self.shared.queue.generation();
        self.shared.store.begin_trajectory(total_points);
        TrajectoryHandle { generation }
    }

    pub fn add_waypoint(&self, waypoint: Waypoint) -> Result<(), MotionError> {
        self.enqueue(waypoint, None)
    }

    /// Enqueues a waypoint of the trajectory `handle` was issued for. Fails
    /// with `QueueError::Cleared` if that trajectory has been stopped.
    pub fn add_trajectory_waypoint(
        &self,
        handle: TrajectoryHandle,
        waypoint: Waypoint,
    ) -> Result<(), MotionError> {
        self.enqueue(waypoint, Some(handle.generation))
    }

    fn enqueue(&self, waypoint: Waypoint, generation: Option<u64>) -> Result<(), MotionError> {
        if waypoint.dof() != self.dof() {
            return Err(MotionError::DimensionMismatch {
                expected: self.dof(),
                actual: waypoint.dof(),
            });
        }
        self.shared.store.reserve_enqueue();
        let result = match generation {
            Some(generation) => self.shared.queue.enqueue_for(waypoint, generation),
            None => self.shared.queue.enqueue(waypoint),
        };
        if let Err(e) = result {
            self.shared.store.release_enqueue();
            return Err(e.into());
        }
        Ok(())
    }

    /// True while waypoints are queued or the worker is still executing one,
    /// settling repeats included.
    pub fn is_in_motion(&self) -> bool {
        self.shared.queue.is_busy()
    }

    /// Drops every queued waypoint and arms the one-shot stop flag: the
    /// worker's next commit is discarded and the flag cleared.
    pub fn stop(&self) {
        let mut state = self.shared.store.lock();
        let dropped = self.shared.queue.clear();
        state.stop_requested = true;
        drop(state);
        tracing::info!(dropped, "Motion stop requested");
    }

    /// Asks the worker to exit after its current iteration. Queued waypoints
    /// are left in place.
    pub fn shutdown(&self) {
        self.shared.store.request_shutdown();
        self.shared.queue.close();
        tracing::info!(pending = self.shared.queue.len(), "Motion controller shutting down");
    }

    /// Waits for the worker thread to exit. Only meaningful after `shutdown`.
    pub fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Motion worker thread panicked");
            }
        }
    }

    pub fn get_joint_positions(&self) -> Vec<f64> {
        self.shared.store.positions()
    }

    pub fn snapshot(&self) -> JointState {
        self.shared.store.read()
    }

    /// Applies an external pose only while the controller is at rest.
    /// Returns whether it was applied.
    pub fn update_from_feedback(&self, positions: &[f64]) -> Result<bool, MotionError> {
        if positions.len() != self.dof() {
            return Err(MotionError::DimensionMismatch {
                expected: self.dof(),
                actual: positions.len(),
            });
        }
        let applied = self
            .shared
            .store
            .update_from_feedback(positions, || self.shared.queue.is_busy());
        if !applied {
            tracing::debug!("Ignoring joint feedback while in motion");
        }
        Ok(applied)
    }

    pub fn set_buffer_occupancy(&self, occupancy: i64) {
        self.shared.store.set_buffer_occupancy(occupancy);
    }

    pub fn set_controller_connected(&self, connected: bool) {
        self.shared.store.set_controller_connected(connected);
    }

    pub fn set_link_ready(&self, ready: bool) {
        self.shared.store.set_link_ready(ready);
    }

    pub fn link_ready(&self) -> bool {
        self.shared.store.link_ready()
    }

    pub fn progress(&self) -> TrajectoryProgress {
        self.shared.store.progress()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }
}

impl Drop for MotionController {
    fn drop(&mut self) {
        self.shared.store.request_shutdown();
        self.shared.queue.close();
    }
}
