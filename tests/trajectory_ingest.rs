// Integration tests for trajectory ingestion, the status feed and the joint-state publisher

#[cfg(test)]
mod tests {
    use robot_motion_sim::{
        ChannelSink, ControllerConfig, IngestError, OverflowPolicy, JointStateMessage, JointTrajectory,
        MotionController, RibStatus, SimulatedDownstream, SystemClock, TrajectoryIngest,
        TrajectoryPoint, run_joint_state_publisher,
    };
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn wait_idle(ctrl: &MotionController) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while ctrl.is_in_motion() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!ctrl.is_in_motion());
    }

    fn arm_config() -> ControllerConfig {
        ControllerConfig {
            joint_names: names(&["shoulder", "elbow", "wrist"]),
            start_connected: true,
            connection_poll_ms: 1,
            ..ControllerConfig::default()
        }
    }

    #[test]
    fn test_trajectory_in_sender_order_executes() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let ctrl = Arc::new(
            MotionController::spawn(&arm_config(), Arc::new(ChannelSink::new(tx)), Arc::new(SystemClock))
                .unwrap(),
        );
        let ingest = TrajectoryIngest::new(Arc::clone(&ctrl));
        let trajectory = JointTrajectory {
            joint_names: names(&["wrist", "shoulder", "elbow"]),
            points: vec![
                TrajectoryPoint {
                    positions: vec![0.0, 0.0, 0.0],
                    velocities: Vec::new(),
                    accelerations: Vec::new(),
                    time_from_start: 0.0,
                },
                TrajectoryPoint {
                    positions: vec![0.3, 0.1, 0.2],
                    velocities: Vec::new(),
                    accelerations: Vec::new(),
                    time_from_start: 0.05,
                },
            ],
        };
        assert!(ingest.handle(&trajectory).unwrap().is_some());
        wait_idle(&ctrl);

        let last = rx.try_iter().last().unwrap();
        assert_eq!(last.positions, vec![0.1, 0.2, 0.3]);
        assert_eq!(ctrl.get_joint_positions(), vec![0.1, 0.2, 0.3]);

        // A second trajectory once idle is accepted as a new one
        assert!(ingest.handle(&trajectory).unwrap().is_some());
        wait_idle(&ctrl);
        ctrl.shutdown();
        ctrl.join();
    }

    #[test]
    fn test_missing_joint_rejected_before_enqueue() {
        let ctrl = Arc::new(
            MotionController::spawn(
                &arm_config(),
                Arc::new(robot_motion_sim::TracingSink),
                Arc::new(SystemClock),
            )
            .unwrap(),
        );
        let ingest = TrajectoryIngest::new(Arc::clone(&ctrl));
        let trajectory: JointTrajectory = serde_json::from_str(
            r#"{"joint_names":["shoulder","elbow"],"points":[{"positions":[0.0,0.0],"time_from_start":0.0}]}"#,
        )
        .unwrap();
        assert!(matches!(ingest.handle(&trajectory), Err(IngestError::MissingJoint(_))));
        assert_eq!(ctrl.queue_len(), 0);
        assert_eq!(ctrl.progress().declared, 0);
    }

    #[test]
    fn test_stop_cancels_blocked_ingest() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = ControllerConfig {
            start_connected: false,
            queue_capacity: 2,
            overflow: OverflowPolicy::Block,
            ..arm_config()
        };
        let ctrl = Arc::new(
            MotionController::spawn(&config, Arc::new(ChannelSink::new(tx)), Arc::new(SystemClock))
                .unwrap(),
        );
        let before = ctrl.snapshot();
        let trajectory = JointTrajectory {
            joint_names: names(&["shoulder", "elbow", "wrist"]),
            points: (0..6)
                .map(|i| TrajectoryPoint {
                    positions: vec![i as f64; 3],
                    velocities: Vec::new(),
                    accelerations: Vec::new(),
                    time_from_start: i as f64 * 0.01,
                })
                .collect(),
        };
        let ingest = TrajectoryIngest::new(Arc::clone(&ctrl));
        let producer = thread::spawn(move || ingest.handle(&trajectory));

        // The link is down, so the producer fills the queue and blocks
        let deadline = Instant::now() + Duration::from_secs(5);
        while ctrl.queue_len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ctrl.queue_len(), 2);
        ctrl.stop();

        let result = producer.join().unwrap();
        assert!(
            matches!(result, Err(IngestError::Cancelled { enqueued: 2, total: 6 })),
            "got {:?}",
            result
        );
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ctrl.queue_len(), 0);
        assert!(!ctrl.is_in_motion());

        ctrl.set_link_ready(true);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ctrl.snapshot(), before);
        assert!(rx.try_recv().is_err());
        assert!(!ctrl.is_in_motion());
        ctrl.shutdown();
        ctrl.join();
    }

    #[test]
    fn test_simulated_downstream_feeds_backpressure() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let downstream = Arc::new(SimulatedDownstream::new(ChannelSink::new(tx)));
        let config = ControllerConfig {
            high_water_mark: 10,
            ..arm_config()
        };
        let ctrl = MotionController::spawn(&config, downstream.clone(), Arc::new(SystemClock)).unwrap();
        ctrl.begin_trajectory(2);
        ctrl.add_waypoint(robot_motion_sim::Waypoint::at_rest(vec![0.0; 3], 0.0).unwrap())
            .unwrap();
        ctrl.add_waypoint(robot_motion_sim::Waypoint::at_rest(vec![1.0; 3], 100.0).unwrap())
            .unwrap();

        // Nothing drains the buffer: feed its status until the worker is held back
        let deadline = Instant::now() + Duration::from_secs(5);
        while downstream.occupancy() <= 10 && Instant::now() < deadline {
            downstream.status(true).apply(&ctrl);
            thread::sleep(Duration::from_millis(1));
        }
        downstream.status(true).apply(&ctrl);
        thread::sleep(Duration::from_millis(30));
        let held = rx.try_iter().count();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rx.try_iter().count(), 0);
        assert!(held > 10);
        assert!(ctrl.is_in_motion());

        downstream.drain(i64::MAX);
        RibStatus::from_raw(&[0, 1, 1]).unwrap().apply(&ctrl);
        wait_idle(&ctrl);
        assert_eq!(ctrl.get_joint_positions(), vec![1.0; 3]);
        ctrl.shutdown();
        ctrl.join();
    }

    #[tokio::test]
    async fn test_publisher_waits_for_link_then_emits() {
        let config = ControllerConfig {
            joint_names: names(&["shoulder", "elbow", "wrist"]),
            connection_poll_ms: 1,
            initial_joint_state: Some(vec![0.1, 0.2, 0.3]),
            ..ControllerConfig::default()
        };
        let ctrl = Arc::new(
            MotionController::spawn(&config, Arc::new(robot_motion_sim::TracingSink), Arc::new(SystemClock))
                .unwrap(),
        );
        let received: Arc<Mutex<Vec<JointStateMessage>>> = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let sink = Arc::clone(&received);
        let task = tokio::spawn(run_joint_state_publisher(
            Arc::clone(&ctrl),
            Duration::from_millis(5),
            shutdown_rx,
            move |msg| sink.lock().unwrap().push(msg),
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(received.lock().unwrap().is_empty());

        ctrl.set_link_ready(true);
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        let messages = received.lock().unwrap();
        assert!(!messages.is_empty());
        assert_eq!(messages[0].names, names(&["shoulder", "elbow", "wrist"]));
        assert_eq!(messages[0].positions, vec![0.1, 0.2, 0.3]);
    }
}
