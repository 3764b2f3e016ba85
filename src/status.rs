// src/status.rs - Downstream controller status feed and a simulated downstream buffer
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

use crate::controller::MotionController;
use crate::publisher::{JointSample, PublishError, SampleSink};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("Status message has {0} values, expected at least 3")]
    Truncated(usize),
}

/// Controller buffer status: `[occupancy, mode, connected]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RibStatus {
    pub buffer_occupancy: i64,
    pub mode: i32,
    pub controller_connected: bool,
}

impl RibStatus {
    pub fn from_raw(data: &[i32]) -> Result<Self, StatusError> {
        match data {
            [occupancy, mode, connected, ..] => Ok(Self {
                buffer_occupancy: i64::from(*occupancy),
                mode: *mode,
                controller_connected: *connected != 0,
            }),
            _ => Err(StatusError::Truncated(data.len())),
        }
    }

    pub fn to_raw(&self) -> [i32; 3] {
        [
            i32::try_from(self.buffer_occupancy).unwrap_or(i32::MAX),
            self.mode,
            i32::from(self.controller_connected),
        ]
    }

    /// Pushes occupancy and the connected flag into the controller's pacing inputs.
    pub fn apply(&self, controller: &MotionController) {
        tracing::trace!(
            occupancy = self.buffer_occupancy,
            mode = self.mode,
            connected = self.controller_connected,
            "Downstream status"
        );
        controller.set_buffer_occupancy(self.buffer_occupancy);
        controller.set_controller_connected(self.controller_connected);
    }
}

/// Sink decorator standing in for the downstream controller's sample buffer:
/// every forwarded sample occupies one slot until drained.
#[derive(Debug)]
pub struct SimulatedDownstream<S: SampleSink> {
    inner: S,
    occupancy: AtomicI64,
    mode: i32,
}

impl<S: SampleSink> SimulatedDownstream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            occupancy: AtomicI64::new(0),
            mode: 1,
        }
    }

    pub fn occupancy(&self) -> i64 {
        self.occupancy.load(Ordering::SeqCst)
    }

    /// Consumes up to `samples` buffered samples and returns the new occupancy.
    pub fn drain(&self, samples: i64) -> i64 {
        let previous = self
            .occupancy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some((current - samples).max(0))
            })
            .unwrap_or_else(|current| current);
        (previous - samples).max(0)
    }

    pub fn status(&self, controller_connected: bool) -> RibStatus {
        RibStatus {
            buffer_occupancy: self.occupancy(),
            mode: self.mode,
            controller_connected,
        }
    }
}

impl<S: SampleSink> SampleSink for SimulatedDownstream<S> {
    fn publish(&self, sample: &JointSample) -> Result<(), PublishError> {
        self.inner.publish(sample)?;
        self.occupancy.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
