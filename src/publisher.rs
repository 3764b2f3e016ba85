// src/publisher.rs - Outbound samples and the periodic joint-state feed
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::controller::MotionController;
use crate::state::JointState;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Sample receiver disconnected")]
    Disconnected,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One committed sample, as sent to the downstream controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointSample {
    pub stamp: DateTime<Utc>,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
}

impl JointSample {
    pub fn new(stamp: DateTime<Utc>, state: &JointState) -> Self {
        Self {
            stamp,
            positions: state.positions.clone(),
            velocities: state.velocities.clone(),
            accelerations: state.accelerations.clone(),
        }
    }
}

/// Fire-and-forget receiver of committed samples. Called from the worker thread.
pub trait SampleSink: Send + Sync {
    fn publish(&self, sample: &JointSample) -> Result<(), PublishError>;
}

/// Forwards samples over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<JointSample>,
}

impl ChannelSink {
    pub fn new(tx: Sender<JointSample>) -> Self {
        Self { tx }
    }
}

impl SampleSink for ChannelSink {
    fn publish(&self, sample: &JointSample) -> Result<(), PublishError> {
        self.tx
            .send(sample.clone())
            .map_err(|_| PublishError::Disconnected)
    }
}

/// Writes one JSON object per sample.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> SampleSink for JsonLinesSink<W> {
    fn publish(&self, sample: &JointSample) -> Result<(), PublishError> {
        let line = serde_json::to_string(sample)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Logs every sample at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SampleSink for TracingSink {
    fn publish(&self, sample: &JointSample) -> Result<(), PublishError> {
        tracing::trace!(stamp = %sample.stamp, positions = ?sample.positions, "Joint sample");
        Ok(())
    }
}

/// Named joint positions, as published on the periodic state feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointStateMessage {
    pub stamp: DateTime<Utc>,
    pub names: Vec<String>,
    pub positions: Vec<f64>,
}

/// Publishes the controller's joint positions every `period` until `shutdown`
/// fires. Nothing is published before the controller link is up.
pub async fn run_joint_state_publisher<F>(
    controller: Arc<MotionController>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut emit: F,
) where
    F: FnMut(JointStateMessage) + Send,
{
    let names = controller.joint_names().to_vec();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::debug!("Joint state publisher running every {:?}", period);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("Joint state publisher stopping");
                break;
            }
            _ = interval.tick() => {
                if !controller.link_ready() {
                    continue;
                }
                emit(JointStateMessage {
                    stamp: Utc::now(),
                    names: names.clone(),
                    positions: controller.get_joint_positions(),
                });
            }
        }
    }
}
