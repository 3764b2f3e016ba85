// src/waypoint.rs - Commanded joint pose with target time
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WaypointError {
    #[error("Waypoint has no joints")]
    Empty,
    #[error("{field} has {actual} values, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Non-finite {field} value for joint {joint}")]
    NonFinite { field: &'static str, joint: usize },
    #[error("Invalid time_from_start: {0}")]
    InvalidTime(f64),
}

/// A single commanded joint pose with velocity, acceleration and a nominal
/// time from the start of its trajectory (seconds).
///
/// Fields are private: a waypoint is validated once on construction and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    positions: Vec<f64>,
    velocities: Vec<f64>,
    accelerations: Vec<f64>,
    time_from_start: f64,
}

impl Waypoint {
    pub fn new(
        positions: Vec<f64>,
        velocities: Vec<f64>,
        accelerations: Vec<f64>,
        time_from_start: f64,
    ) -> Result<Self, WaypointError> {
        if positions.is_empty() {
            return Err(WaypointError::Empty);
        }
        let expected = positions.len();
        for (field, values) in [("velocities", &velocities), ("accelerations", &accelerations)] {
            if values.len() != expected {
                return Err(WaypointError::LengthMismatch {
                    field,
                    expected,
                    actual: values.len(),
                });
            }
        }
        for (field, values) in [
            ("position", &positions),
            ("velocity", &velocities),
            ("acceleration", &accelerations),
        ] {
            if let Some(joint) = values.iter().position(|v| !v.is_finite()) {
                return Err(WaypointError::NonFinite { field, joint });
            }
        }
        if !time_from_start.is_finite() || time_from_start < 0.0 {
            return Err(WaypointError::InvalidTime(time_from_start));
        }
        Ok(Self {
            positions,
            velocities,
            accelerations,
            time_from_start,
        })
    }

    /// Waypoint with zero velocity and acceleration on every joint.
    pub fn at_rest(positions: Vec<f64>, time_from_start: f64) -> Result<Self, WaypointError> {
        let zeros = vec![0.0; positions.len()];
        Self::new(positions, zeros.clone(), zeros, time_from_start)
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    pub fn accelerations(&self) -> &[f64] {
        &self.accelerations
    }

    pub fn time_from_start(&self) -> f64 {
        self.time_from_start
    }

    pub fn dof(&self) -> usize {
        self.positions.len()
    }
}
