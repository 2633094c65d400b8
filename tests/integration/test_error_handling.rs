//! Integration Tests for Error Handling
//!
//! Per-command failures are recorded and skipped; fatal failures end the
//! session with a kind-labeled report, and the link is closed either way.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;

use test_utils::fixtures::STROKE_PROGRAM;
use test_utils::{simulator, ProgramDir};
use tictacplot::link::{DeviceBehavior, SimulatorConnector};
use tictacplot::models::{AbandonReason, CommandOutcome};
use tictacplot::{Error, ErrorKind, GateTimeoutPolicy, Session, SessionManager, SessionStatus};

fn aborted_kind(status: &SessionStatus) -> Option<ErrorKind> {
    match status {
        SessionStatus::Aborted { kind, .. } => Some(*kind),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_device_hang_up_aborts_session() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    // Origin, poll, first command, then gone on the next poll
    let behavior = DeviceBehavior {
        hang_up_after: Some(4),
        ..DeviceBehavior::default()
    };
    let (session, connector) = programs.session(behavior);

    let report = session.run("stroke").await.unwrap();
    assert_eq!(aborted_kind(&report.status), Some(ErrorKind::Disconnected));
    assert_eq!(report.records.len(), 1);
    assert!(report.records[0].outcome.is_executed());
    assert!(report.summary().contains("ABORTED [Disconnected]"));

    connector.shutdown().await;
    assert!(connector.device_log(0).unwrap().hung_up);
}

#[tokio::test(start_paused = true)]
async fn test_untransformable_commands_are_skipped() {
    let programs =
        ProgramDir::new().with("broken", "G4 Pabc\nG1 X1 Y1\nG1Z F500\nG1 X2 Y2\n");
    let (session, connector) = programs.session(DeviceBehavior::responsive());

    let report = session.run("broken").await.unwrap();
    assert!(report.is_degraded());
    assert_eq!(report.executed_count(), 2);

    let skipped: Vec<usize> = report.abandoned().map(|(record, _)| record.line).collect();
    assert_eq!(skipped, vec![1, 3]);
    for (record, reason) in report.abandoned() {
        assert!(matches!(reason, AbandonReason::Transform { .. }));
        assert_eq!(record.transformed, None);
    }

    connector.shutdown().await;
    assert_eq!(
        connector.device_log(0).unwrap().commands(),
        vec!["G92 X0 Y0 Z0", "G1 X1 Y1", "G1 X2 Y2"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_gate_timeout_can_abort() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let mut config = programs.config();
    config.gate.on_timeout = GateTimeoutPolicy::Abort;
    let connector = simulator(DeviceBehavior::silent());
    let session = Session::with_connector(config, connector.clone()).unwrap();

    let report = session.run("stroke").await.unwrap();
    assert_eq!(aborted_kind(&report.status), Some(ErrorKind::NotReady));
    assert!(report.records.is_empty());

    connector.shutdown().await;
    assert!(connector.device_log(0).unwrap().closed_by_host);
}

#[tokio::test(start_paused = true)]
async fn test_session_deadline() {
    let long_program = "G1 X1\n".repeat(20);
    let programs = ProgramDir::new().with("long", &long_program);
    let mut config = programs.config();
    config.session.deadline_secs = Some(1);
    let connector = simulator(DeviceBehavior::silent());
    let session = Session::with_connector(config, connector.clone()).unwrap();

    let report = session.run("long").await.unwrap();
    assert_eq!(aborted_kind(&report.status), Some(ErrorKind::Deadline));
    assert!(report.records.len() < 20);
    assert!(report
        .records
        .iter()
        .all(|r| matches!(r.outcome, CommandOutcome::Abandoned(_))));

    connector.shutdown().await;
    assert!(connector.device_log(0).unwrap().closed_by_host);
}

#[tokio::test(start_paused = true)]
async fn test_refused_port_is_connection_error() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let connector = Arc::new(SimulatorConnector::refusing());
    let session = Session::with_connector(programs.config(), connector).unwrap();

    let err = session.run("stroke").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn test_port_in_use_until_session_ends() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let manager = SessionManager::with_connector(simulator(DeviceBehavior::responsive()));
    let config = programs.config();

    let first = manager.start(config.clone(), "stroke").await.unwrap();
    let err = manager.start(config.clone(), "stroke").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::PortInUse);

    first.join().await.unwrap();
    let second = manager.start(config, "stroke").await.unwrap();
    assert!(second.join().await.unwrap().is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_missing_program_through_manager() {
    let programs = ProgramDir::new();
    let manager = SessionManager::with_connector(simulator(DeviceBehavior::responsive()));
    let config = programs.config();

    let handle = manager.start(config.clone(), "draw_o_1").await.unwrap();
    assert!(matches!(
        handle.join().await,
        Err(Error::ProgramNotFound { .. })
    ));
    // The port is free again
    assert!(!manager.is_busy(&config.link.port).await);
}

#[test]
fn test_invalid_config_is_rejected_up_front() {
    let mut config = tictacplot::Config::fast();
    config.gate.max_wait_ms = 1;
    match Session::new(config) {
        Err(Error::ConfigValidationFailed { field, .. }) => assert_eq!(field, "gate.max_wait_ms"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("accepted an invalid config"),
    }
}
