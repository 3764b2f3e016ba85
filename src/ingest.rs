// src/ingest.rs - Trajectory ingestion: remap by joint name, validate, enqueue
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

use crate::controller::{MotionController, MotionError};
use crate::queue::QueueError;
use crate::waypoint::{Waypoint, WaypointError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Trajectory does not name controller joint '{0}'")]
    MissingJoint(String),
    #[error("Point {index}: {field} has {actual} values for {expected} joint names")]
    LengthMismatch {
        index: usize,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Point {index}: {source}")]
    InvalidPoint {
        index: usize,
        #[source]
        source: WaypointError,
    },
    #[error("Received a new trajectory while in motion; splicing is not supported")]
    InMotion,
    #[error("Trajectory cancelled by a stop after {enqueued} of {total} points")]
    Cancelled { enqueued: usize, total: usize },
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrajectoryPoint {
    pub positions: Vec<f64>,
    /// Empty means all zeros.
    #[serde(default)]
    pub velocities: Vec<f64>,
    #[serde(default)]
    pub accelerations: Vec<f64>,
    pub time_from_start: f64,
}

/// Inbound trajectory in the sender's own joint order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct JointTrajectory {
    pub joint_names: Vec<String>,
    #[serde(default)]
    pub points: Vec<TrajectoryPoint>,
}

impl JointTrajectory {
    /// Reads a trajectory file; `.toml` files are parsed as TOML, anything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(serde_json::from_str(&contents)?)
        }
    }

    /// Reorders every point into `controller_joints` order.
    pub fn remap(&self, controller_joints: &[String]) -> Result<Vec<Waypoint>, IngestError> {
        let indices = controller_joints
            .iter()
            .map(|name| {
                self.joint_names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| IngestError::MissingJoint(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.points
            .iter()
            .enumerate()
            .map(|(index, point)| {
                let pick = |field: &'static str, values: &[f64]| -> Result<Vec<f64>, IngestError> {
                    if values.is_empty() && field != "positions" {
                        return Ok(vec![0.0; indices.len()]);
                    }
                    if values.len() != self.joint_names.len() {
                        return Err(IngestError::LengthMismatch {
                            index,
                            field,
                            expected: self.joint_names.len(),
                            actual: values.len(),
                        });
                    }
                    Ok(indices.iter().map(|&i| values[i]).collect())
                };
                Waypoint::new(
                    pick("positions", &point.positions)?,
                    pick("velocities", &point.velocities)?,
                    pick("accelerations", &point.accelerations)?,
                    point.time_from_start,
                )
                .map_err(|source| IngestError::InvalidPoint { index, source })
            })
            .collect()
    }
}

/// Feeds whole trajectories into a [`MotionController`].
pub struct TrajectoryIngest {
    controller: Arc<MotionController>,
    enabled: AtomicBool,
}

impl TrajectoryIngest {
    pub fn new(controller: Arc<MotionController>) -> Self {
        Self {
            controller,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Remaps, validates and enqueues `trajectory`. Returns the id assigned to
    /// it, or `None` if it was ignored (ingestion disabled or no points).
    ///
    /// May block when the controller queue is bounded with the `block` policy.
    pub fn handle(&self, trajectory: &JointTrajectory) -> Result<Option<Uuid>, IngestError> {
        if !self.is_enabled() {
            tracing::debug!("Trajectory ingestion disabled, ignoring trajectory");
            return Ok(None);
        }
        if trajectory.points.is_empty() {
            tracing::debug!("Ignoring empty trajectory");
            return Ok(None);
        }
        if self.controller.is_in_motion() {
            tracing::error!("Received new trajectory while in motion, splicing is not supported; stopping");
            self.controller.stop();
            return Err(IngestError::InMotion);
        }

        let waypoints = trajectory.remap(self.controller.joint_names())?;
        let id = Uuid::new_v4();
        tracing::info!(trajectory = %id, points = waypoints.len(), "Executing trajectory");

        let total = waypoints.len();
        let handle = self.controller.begin_trajectory(total);
        for (enqueued, waypoint) in waypoints.into_iter().enumerate() {
            match self.controller.add_trajectory_waypoint(handle, waypoint) {
                Ok(()) => {}
                Err(MotionError::Queue(QueueError::Cleared)) => {
                    tracing::info!(trajectory = %id, enqueued, total, "Trajectory cancelled by stop");
                    return Err(IngestError::Cancelled { enqueued, total });
                }
                Err(e) => {
                    tracing::error!(trajectory = %id, "Failed to enqueue waypoint, stopping: {}", e);
                    self.controller.stop();
                    return Err(e.into());
                }
            }
        }
        Ok(Some(id))
    }
}
