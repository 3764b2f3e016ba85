// src/interpolation.rs - Boundary-value cubic between two waypoints
//
// Each joint follows the cubic that passes through both endpoint positions and
// has the prescribed accelerations (second derivatives) at both ends. Local
// time runs from 0 at `prev` to T at `cur`.
use thiserror::Error;

use crate::state::JointState;
use crate::waypoint::Waypoint;

#[derive(Debug, Error, PartialEq)]
pub enum InterpolationError {
    #[error("Segment duration must be positive, got {0}")]
    DegenerateSegment(f64),
    #[error("Segment endpoints have {prev} and {cur} joints")]
    DimensionMismatch { prev: usize, cur: usize },
}

/// Position at local time `t` of the natural-cubic segment of length `duration`.
pub fn cubic_position(p0: f64, a0: f64, p1: f64, a1: f64, duration: f64, t: f64) -> f64 {
    let tk = duration - t;
    let ts = t;
    let t2 = duration * duration;
    (tk * tk * tk * a0 + ts * ts * ts * a1 + (6.0 * p1 - t2 * a1) * ts + (6.0 * p0 - t2 * a0) * tk)
        / (6.0 * duration)
}

/// First derivative of [`cubic_position`].
pub fn cubic_velocity(p0: f64, a0: f64, p1: f64, a1: f64, duration: f64, t: f64) -> f64 {
    let tk = duration - t;
    let ts = t;
    let t2 = duration * duration;
    (3.0 * ts * ts * a1 - 3.0 * tk * tk * a0 + 6.0 * (p1 - p0) - t2 * (a1 - a0)) / (6.0 * duration)
}

/// Second derivative of [`cubic_position`]; linear between the endpoint accelerations.
pub fn cubic_acceleration(a0: f64, a1: f64, duration: f64, t: f64) -> f64 {
    ((duration - t) * a0 + t * a1) / duration
}

/// Interpolation segment borrowing its two endpoint waypoints.
#[derive(Debug, Clone, Copy)]
pub struct SplineSegment<'a> {
    prev: &'a Waypoint,
    cur: &'a Waypoint,
    duration: f64,
}

impl<'a> SplineSegment<'a> {
    pub fn new(prev: &'a Waypoint, cur: &'a Waypoint) -> Result<Self, InterpolationError> {
        if prev.dof() != cur.dof() {
            return Err(InterpolationError::DimensionMismatch {
                prev: prev.dof(),
                cur: cur.dof(),
            });
        }
        let duration = cur.time_from_start() - prev.time_from_start();
        if duration <= 0.0 {
            return Err(InterpolationError::DegenerateSegment(duration));
        }
        Ok(Self {
            prev,
            cur,
            duration,
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Interpolated position of `joint` at local time `t`, clamped to the
    /// segment. The endpoints are returned exactly.
    pub fn position(&self, joint: usize, t: f64) -> f64 {
        if t <= 0.0 {
            return self.prev.positions()[joint];
        }
        if t >= self.duration {
            return self.cur.positions()[joint];
        }
        cubic_position(
            self.prev.positions()[joint],
            self.prev.accelerations()[joint],
            self.cur.positions()[joint],
            self.cur.accelerations()[joint],
            self.duration,
            t,
        )
    }

    pub fn velocity(&self, joint: usize, t: f64) -> f64 {
        cubic_velocity(
            self.prev.positions()[joint],
            self.prev.accelerations()[joint],
            self.cur.positions()[joint],
            self.cur.accelerations()[joint],
            self.duration,
            t.clamp(0.0, self.duration),
        )
    }

    pub fn acceleration(&self, joint: usize, t: f64) -> f64 {
        cubic_acceleration(
            self.prev.accelerations()[joint],
            self.cur.accelerations()[joint],
            self.duration,
            t.clamp(0.0, self.duration),
        )
    }

    /// Full joint state at local time `t`.
    pub fn sample(&self, t: f64) -> JointState {
        let dof = self.prev.dof();
        JointState {
            positions: (0..dof).map(|j| self.position(j, t)).collect(),
            velocities: (0..dof).map(|j| self.velocity(j, t)).collect(),
            accelerations: (0..dof).map(|j| self.acceleration(j, t)).collect(),
        }
    }
}
