use std::io::Write;
use std::time::Duration;

use bsn_core::{Destination, Frame, Message, MovementState, MsgValue, NodeId, RoundOutcome};
use bsn_node::{Config, LinkConfig, MotionProfile, NetworkReport, SensorConfig, SetupError, Simulation};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

fn config() -> Config {
    let mut config = Config::default();
    config.simulation.seed = Some(7);
    config
}

fn with_sensor(mut config: Config, node: u16, profile: MotionProfile, stall_after: Option<usize>) -> Config {
    config.sensors.push(SensorConfig {
        node: NodeId(node),
        profile,
        stall_after,
    });
    config
}

async fn run_simulation(simulation: Simulation, duration: Duration) -> NetworkReport {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(simulation.run(cancel.clone()));

    tokio::time::sleep(duration).await;
    cancel.cancel();

    handle.await.unwrap().unwrap()
}

async fn run_for(config: Config, duration: Duration) -> NetworkReport {
    run_simulation(Simulation::new(config).unwrap(), duration).await
}

#[tokio::test(start_paused = true)]
async fn calm_network_completes_rounds_without_alerts() {
    let report = run_for(config(), Duration::from_secs(25)).await;

    // 200 samples at 50 ms per round, 1 s between rounds
    assert_eq!(report.rounds.len(), 2);
    for summary in &report.rounds {
        assert!(matches!(
            summary.outcome,
            RoundOutcome::Complete {
                state: MovementState::NoMovement,
                ..
            }
        ));
        assert_eq!(summary.outcome.record().len(), 4);
    }
    assert_eq!(report.rounds[0].outcome.msg_id(), 0);
    assert_eq!(report.rounds[1].outcome.msg_id(), 1);
    assert!(report.alerts.is_empty());

    for node in 1..=4 {
        assert_eq!(report.peripherals[&NodeId(node)].reported, 2);
    }
}

#[tokio::test(start_paused = true)]
async fn walking_wearer_reports_movement() {
    let config = with_sensor(config(), 1, MotionProfile::Walking, None);
    let report = run_for(config, Duration::from_secs(12)).await;

    assert_eq!(report.rounds.len(), 1);
    let outcome = &report.rounds[0].outcome;
    assert!(matches!(
        outcome,
        RoundOutcome::Complete {
            state: MovementState::Movement,
            ..
        }
    ));
    assert_eq!(outcome.record().get(NodeId(1)), Some(MovementState::Movement));
    assert_eq!(outcome.record().get(NodeId(2)), Some(MovementState::NoMovement));
}

#[tokio::test(start_paused = true)]
async fn seizure_raises_alert_from_its_peripheral() {
    let config = with_sensor(config(), 3, MotionProfile::Seizure, None);
    let report = run_for(config, Duration::from_secs(12)).await;

    assert!(matches!(
        report.rounds[0].outcome,
        RoundOutcome::Crisis {
            msg_id: 0,
            source: NodeId(3),
            ..
        }
    ));
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].source, NodeId(3));
    assert_eq!(report.alerts[0].msg_id, 0);
    assert_eq!(report.crisis_rounds(), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_sensor_times_out_the_round() {
    let config = with_sensor(config(), 2, MotionProfile::Calm, Some(0));
    let report = run_for(config, Duration::from_secs(22)).await;

    assert_eq!(report.rounds.len(), 1);
    match &report.rounds[0].outcome {
        RoundOutcome::Timeout {
            msg_id,
            record,
            missing,
        } => {
            assert_eq!(*msg_id, 0);
            assert_eq!(missing, &vec![NodeId(2)]);
            assert_eq!(record.len(), 3);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }

    let stalled = report.peripherals[&NodeId(2)];
    assert_eq!(stalled.reported, 0);
    assert_eq!(stalled.dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn unanswered_round_is_abandoned() {
    let mut config = config();
    config.network.link_loss = 1.0;

    let report = run_for(config, Duration::from_millis(20_500)).await;

    assert_eq!(report.rounds.len(), 1);
    match &report.rounds[0].outcome {
        RoundOutcome::Timeout {
            record, missing, ..
        } => {
            assert!(record.is_empty());
            assert_eq!(missing.len(), 4);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(report.frames.sent, 1);
    assert_eq!(report.frames.lost, 4);
}

#[tokio::test(start_paused = true)]
async fn boot_acquisition_is_never_reported() {
    let mut config = config();
    config.protocol.acquire_on_boot = true;

    // the boot round keeps every peripheral busy when the first request lands
    let report = run_for(config, Duration::from_millis(20_500)).await;

    assert_eq!(report.timed_out_rounds(), 1);
    for node in 1..=4 {
        let stats = report.peripherals[&NodeId(node)];
        assert_eq!(stats.reported, 0);
        assert_eq!(stats.last_state, Some(MovementState::NoMovement));
    }
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_counted_and_dropped() {
    let simulation = Simulation::new(config()).unwrap();

    assert!(simulation.radio().deliver_raw(NodeId(0), vec![0xde, 0xad]));
    let mut bad_preamble = Frame::new(NodeId(0), Destination::Broadcast, Message::request(0)).to_bytes();
    bad_preamble[0] = 0x00;
    assert!(simulation.radio().deliver_raw(NodeId(1), bad_preamble.to_vec()));
    assert!(!simulation.radio().deliver_raw(NodeId(42), vec![1, 2, 3]));

    assert_eq!(simulation.state().report().frames.malformed, 0);

    let report = run_simulation(simulation, Duration::from_secs(12)).await;

    assert_eq!(report.frames.malformed, 2);
    assert_eq!(report.complete_rounds(), 1);
}

#[tokio::test(start_paused = true)]
async fn injected_crisis_report_escalates_immediately() {
    let simulation = Simulation::new(config()).unwrap();

    let forged = Frame::new(
        NodeId(4),
        Destination::Node(NodeId(0)),
        Message::response(0, MsgValue::Crisis),
    );
    assert!(simulation.radio().deliver_raw(NodeId(0), forged.to_bytes().to_vec()));

    let report = run_simulation(simulation, Duration::from_secs(1)).await;

    assert!(matches!(
        report.rounds[0].outcome,
        RoundOutcome::Crisis {
            msg_id: 0,
            source: NodeId(4),
            ..
        }
    ));
    assert_eq!(report.alerts[0].source, NodeId(4));
}

#[tokio::test(start_paused = true)]
async fn config_file_drives_the_network() -> color_eyre::Result<()> {
    let mut file = NamedTempFile::new()?;
    write!(
        file,
        r#"
        [protocol]
        buf_size = 20

        [network]
        coordinator = 100
        peripherals = [101, 102, 103, 104]

        [simulation]
        round_interval_ms = 500
        seed = 3

        [[sensor]]
        node = 104
        profile = "walking"
        "#
    )?;

    let config = Config::load(file.path())?;
    let report = run_for(config, Duration::from_millis(1_200)).await;

    // 20 samples take 1 s
    assert_eq!(report.rounds.len(), 1);
    let record = report.rounds[0].outcome.record();
    assert_eq!(record.len(), 4);
    assert!(record.has_reported(NodeId(104)));

    Ok(())
}

#[test]
fn invalid_network_is_rejected_before_start() {
    let mut config = config();
    config.network.peripherals.push(NodeId(5));

    assert!(Simulation::new(config).is_err());
}

#[tokio::test(start_paused = true)]
async fn cut_link_leaves_its_peripheral_missing() {
    let mut config = config();
    config.network.links.push(LinkConfig {
        from: NodeId(2),
        to: NodeId(0),
        loss: 1.0,
    });

    let report = run_for(config, Duration::from_secs(22)).await;

    // node 2 hears the request and reports, but its uplink is dead
    assert_eq!(report.peripherals[&NodeId(2)].reported, 1);
    match &report.rounds[0].outcome {
        RoundOutcome::Timeout { missing, record, .. } => {
            assert_eq!(missing, &vec![NodeId(2)]);
            assert_eq!(record.len(), 3);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(report.frames.lost, 1);
}

#[test]
fn silent_round_shorter_than_window_is_rejected() {
    // 200 samples at 120 ms take 24 s, so every round would be abandoned
    // before any peripheral could answer
    let mut config = config();
    config.protocol.acq_period_ms = 120;
    config.protocol.pn_timeout_ms = 30_000;

    assert!(matches!(
        Simulation::new(config),
        Err(SetupError::SilentRound {
            window_ms: 24_000,
            ..
        })
    ));
}
