// src/main.rs - motion-sim: run joint trajectories through the simulated controller
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use robot_motion_sim::{
    Config, JointTrajectory, JsonLinesSink, MotionController, SampleSink, SimulatedDownstream,
    SystemClock, TrajectoryIngest, load_config, run_joint_state_publisher,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Simulated robot controller
#[derive(Parser, Debug)]
#[command(name = "motion-sim", about = "Executes joint trajectories on a simulated robot controller.")]
struct Cli {
    /// Path to the TOML config file; defaults are used if it does not exist
    #[arg(short, long, default_value = "robot.toml")]
    config: PathBuf,

    /// Trajectory to execute (JSON, or TOML by extension)
    #[arg(short, long)]
    trajectory: Option<PathBuf>,

    /// Write published samples as JSON lines here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Simulated controller link bring-up time
    #[arg(long, default_value_t = 0)]
    link_delay_ms: u64,
}

fn load_or_default(path: &Path) -> Result<Config, BoxError> {
    if !path.exists() {
        tracing::info!("Config file {} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    tracing::info!("Loading configuration from: {}", path.display());
    Ok(load_config(&path.to_string_lossy())?)
}

/// Drains the simulated downstream buffer at the control rate and feeds its
/// status back into the controller's pacing inputs.
async fn run_status_feed<S: SampleSink + 'static>(
    controller: Arc<MotionController>,
    downstream: Arc<SimulatedDownstream<S>>,
    tick: Duration,
    samples_per_tick: i64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = interval.tick() => {
                downstream.drain(samples_per_tick);
                downstream.status(controller.link_ready()).apply(&controller);
            }
        }
    }
}

async fn wait_until_idle(controller: &MotionController, poll: Duration) {
    let mut interval = tokio::time::interval(poll);
    loop {
        interval.tick().await;
        if !controller.is_in_motion() {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting motion-sim");
    let config = load_or_default(&cli.config)?;
    config.validate()?;
    tracing::info!(
        "Joints: {:?} @ {} Hz",
        config.controller.controller_joint_names(),
        config.controller.update_rate_hz
    );

    let writer: Box<dyn Write + Send> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };
    let downstream = Arc::new(SimulatedDownstream::new(JsonLinesSink::new(writer)));
    let controller = Arc::new(MotionController::spawn(
        &config.controller,
        downstream.clone(),
        Arc::new(SystemClock),
    )?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    // With an external axis the main joints commit once per tick, otherwise once per sub-step.
    let samples_per_tick = if config.controller.external_axis.is_some() {
        1
    } else {
        config.controller.subdivision_factor as i64
    };
    let status_task = tokio::spawn(run_status_feed(
        Arc::clone(&controller),
        Arc::clone(&downstream),
        config.controller.tick(),
        samples_per_tick,
        shutdown_tx.subscribe(),
    ));
    let publisher_task = tokio::spawn(run_joint_state_publisher(
        Arc::clone(&controller),
        config.publisher.period(),
        shutdown_tx.subscribe(),
        |msg| tracing::debug!(stamp = %msg.stamp, positions = ?msg.positions, "joint_states"),
    ));

    if !controller.link_ready() {
        tokio::time::sleep(Duration::from_millis(cli.link_delay_ms)).await;
        controller.set_link_ready(true);
        tracing::info!("Controller link ready");
    }

    let finished = async {
        match &cli.trajectory {
            Some(path) => {
                let trajectory = JointTrajectory::from_path(path)?;
                let ingest = TrajectoryIngest::new(Arc::clone(&controller));
                tokio::task::spawn_blocking(move || ingest.handle(&trajectory)).await??;
                wait_until_idle(&controller, config.controller.tick()).await;
                tracing::info!("Trajectory finished");
            }
            None => std::future::pending::<()>().await,
        }
        Ok::<(), BoxError>(())
    };

    tokio::select! {
        result = finished => result?,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
            Err(e) => tracing::error!("Unable to listen for shutdown signal: {}", e),
        },
    }

    let _ = shutdown_tx.send(());
    controller.shutdown();
    let worker = Arc::clone(&controller);
    tokio::task::spawn_blocking(move || worker.join()).await?;
    status_task.await?;
    publisher_task.await?;

    tracing::info!("Final joint positions: {:?}", controller.get_joint_positions());
    Ok(())
}
