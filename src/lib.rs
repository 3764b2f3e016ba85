//! Simulated robot controller motion execution.
//!
//! Joint-space waypoints go into a [`MotionController`], whose worker thread
//! interpolates each segment with a boundary-value cubic, paces output against
//! a downstream buffer and commits samples into a shared joint state.

pub mod config;
pub mod controller;
pub mod ingest;
pub mod interpolation;
pub mod publisher;
pub mod queue;
pub mod state;
pub mod status;
pub mod time;
pub mod waypoint;
pub mod worker;

pub use config::{Config, ConfigError, ControllerConfig, OverflowPolicy, PublisherConfig, load_config};
pub use controller::{MotionController, MotionError, TrajectoryHandle};
pub use ingest::{IngestError, JointTrajectory, TrajectoryIngest, TrajectoryPoint};
pub use interpolation::{InterpolationError, SplineSegment};
pub use publisher::{
    ChannelSink, JointSample, JointStateMessage, JsonLinesSink, PublishError, SampleSink, TracingSink,
    run_joint_state_publisher,
};
pub use queue::{QueueError, WaypointQueue};
pub use state::{JointState, JointStateStore, TrajectoryProgress};
pub use status::{RibStatus, SimulatedDownstream, StatusError};
pub use time::{SystemClock, TimeInterface};
pub use waypoint::{Waypoint, WaypointError};
pub use worker::{WorkerError, WorkerState};
