//! Integration Tests for Session Flows
//!
//! Whole programs drawn against the simulated board: rewriting, gating,
//! ordering, and the report handed back for clean and degraded runs.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::collections::HashSet;
use std::sync::Arc;

use test_utils::fixtures::{REWRITE_PROGRAM, STROKE_PROGRAM};
use test_utils::{simulator, ProgramDir};
use tictacplot::link::{DeviceBehavior, SimulatorConnector};
use tictacplot::models::{AbandonReason, CommandOutcome};
use tictacplot::{Config, Error, Session, SessionEvent, SessionManager, SessionStatus, Symbol};

#[tokio::test(start_paused = true)]
async fn test_rewritten_commands_reach_device() {
    let programs = ProgramDir::new().with("rewrite", REWRITE_PROGRAM);
    let (session, connector) = programs.session(DeviceBehavior::responsive());

    let report = session.run("rewrite").await.unwrap();
    assert!(report.is_complete(), "{}", report.summary());

    let sent: Vec<_> = report
        .records
        .iter()
        .map(|r| r.transformed.clone().unwrap())
        .collect();
    assert_eq!(sent, vec!["G4 P1.0", "G1 Z-5 F1000"]);

    connector.shutdown().await;
    let log = connector.device_log(0).unwrap();
    assert_eq!(log.commands(), vec!["G92 X0 Y0 Z0", "G4 P1.0", "G1 Z-5 F1000"]);
}

#[tokio::test(start_paused = true)]
async fn test_silent_device_degrades_session() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let (session, connector) = programs.session(DeviceBehavior::silent());

    let report = session.run("stroke").await.unwrap();
    assert!(report.is_degraded(), "{}", report.summary());
    assert_eq!(report.executed_count(), 0);
    assert_eq!(report.records.len(), 4);
    for record in &report.records {
        assert!(matches!(
            record.outcome,
            CommandOutcome::Abandoned(AbandonReason::NotReady { .. })
        ));
    }

    connector.shutdown().await;
    let log = connector.device_log(0).unwrap();
    // Nothing but the origin reset is sent while the board never reports ready
    assert_eq!(log.commands(), vec!["G92 X0 Y0 Z0"]);
    assert!(log.closed_by_host);
}

/// Session with production timings over a simulated board
fn default_timed_session(
    programs: &ProgramDir,
    behavior: DeviceBehavior,
) -> (Session, Arc<SimulatorConnector>) {
    let mut config = Config::default();
    config.program.directory = programs.path().to_path_buf();
    let connector = simulator(behavior);
    let session = Session::with_connector(config, connector.clone()).unwrap();
    (session, connector)
}

#[tokio::test(start_paused = true)]
async fn test_long_program_on_silent_device_degrades_with_default_timings() {
    let programs = ProgramDir::new().with("long", &"G1 X1\n".repeat(25));
    let (session, connector) = default_timed_session(&programs, DeviceBehavior::silent());

    let report = session.run("long").await.unwrap();
    assert!(report.is_degraded(), "{}", report.summary());
    assert_eq!(report.records.len(), 25);
    assert!(report.records.iter().all(|r| matches!(
        r.outcome,
        CommandOutcome::Abandoned(AbandonReason::NotReady { .. })
    )));

    connector.shutdown().await;
    assert!(connector.device_log(0).unwrap().closed_by_host);
}

#[tokio::test(start_paused = true)]
async fn test_long_drawing_completes_with_default_timings() {
    let program: String = (0..1100).map(|i| format!("G1 X{} Y{}\n", i % 50, i % 30)).collect();
    let programs = ProgramDir::new().with("long", &program);
    let (session, _connector) = default_timed_session(&programs, DeviceBehavior::responsive());

    let report = session.run("long").await.unwrap();
    assert_eq!(report.status, SessionStatus::Complete, "{}", report.summary());
    assert_eq!(report.executed_count(), 1100);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_status_ack_does_not_mask_lost_command() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let behavior = DeviceBehavior {
        ack_status_queries: true,
        never_ack: HashSet::from(["G1 X10 Y0".to_string()]),
        ..DeviceBehavior::default()
    };
    let (session, _connector) = programs.session(behavior);
    let retry_max = session.config().dispatch.retry_max;

    let report = session.run("stroke").await.unwrap();
    assert!(report.is_degraded(), "{}", report.summary());
    assert_eq!(report.executed_count(), 3);
    let (record, reason) = report.abandoned().next().unwrap();
    assert_eq!(record.line, 2);
    assert!(matches!(
        reason,
        AbandonReason::NoAcknowledgment { attempts, .. } if *attempts == retry_max
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_commands_use_every_attempt() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let behavior = DeviceBehavior {
        never_ack: HashSet::from(["G1 X10 Y0".to_string()]),
        ..DeviceBehavior::default()
    };
    let (session, connector) = programs.session(behavior);
    let retry_max = session.config().dispatch.retry_max;

    let report = session.run("stroke").await.unwrap();
    assert!(report.is_degraded());
    assert_eq!(report.executed_count(), 3);

    let (record, reason) = report.abandoned().next().unwrap();
    assert_eq!(record.line, 2);
    assert_eq!(
        *reason,
        AbandonReason::NoAcknowledgment {
            attempts: retry_max,
            last_response: None
        }
    );
    assert!(report.summary().contains("line 2: 'G1 X10 Y0' abandoned"));

    connector.shutdown().await;
    let log = connector.device_log(0).unwrap();
    let writes = log.commands().iter().filter(|c| *c == "G1 X10 Y0").count();
    assert_eq!(writes as u32, retry_max);
    // The session carried on after the abandoned command
    assert_eq!(log.commands().last().map(String::as_str), Some("G1 Z-5 F1000"));
}

#[tokio::test(start_paused = true)]
async fn test_responsive_device_completes_first_try() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let (session, _connector) = programs.session(DeviceBehavior::responsive());

    let report = session.run("stroke").await.unwrap();
    assert_eq!(report.status, SessionStatus::Complete);
    assert_eq!(report.total_commands, 4);
    assert!(report
        .records
        .iter()
        .all(|r| r.outcome == CommandOutcome::Executed { attempts: 1 }));
    assert!(report.finished_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_missing_program_fails_before_link_opens() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let (session, connector) = programs.session(DeviceBehavior::responsive());

    match session.run("draw_x_9").await {
        Err(Error::ProgramNotFound { name, .. }) => assert_eq!(name, "draw_x_9"),
        other => panic!("unexpected: {:?}", other.map(|r| r.status)),
    }
    assert_eq!(connector.connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_command_is_gated_in_file_order() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let (session, connector) = programs.session(DeviceBehavior::responsive());

    session.run("stroke").await.unwrap();
    connector.shutdown().await;

    let log = connector.device_log(0).unwrap();
    assert_eq!(
        log.received,
        vec![
            "G92 X0 Y0 Z0",
            "?",
            "G1 Z5 F1000",
            "?",
            "G1 X10 Y0",
            "?",
            "G1 X10 Y10",
            "?",
            "G1 Z-5 F1000",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_busy_board_is_waited_out() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let behavior = DeviceBehavior {
        busy_polls: 2,
        ..DeviceBehavior::default()
    };
    let (session, connector) = programs.session(behavior);

    let report = session.run("stroke").await.unwrap();
    assert!(report.is_complete(), "{}", report.summary());
    let position = report.last_position.unwrap();
    assert_eq!((position.x, position.y), (10.0, 10.0));

    connector.shutdown().await;
    let log = connector.device_log(0).unwrap();
    let polls = log.received.iter().filter(|l| l.as_str() == "?").count();
    // The origin reset busies the board too, so every command waits two polls
    assert_eq!(polls, 4 * 3);
}

#[tokio::test(start_paused = true)]
async fn test_play_move_draws_cell_program() {
    let programs = ProgramDir::new().with("draw_x_5", STROKE_PROGRAM);
    let (session, _connector) = programs.session(DeviceBehavior::responsive());

    let report = session.play_move(Symbol::X, 1, 1).await.unwrap();
    assert_eq!(report.program, "draw_x_5.gcode");
    assert!(report.is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_event_stream_follows_session() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let (session, _connector) = programs.session(DeviceBehavior::responsive());

    let mut handle = session.spawn("stroke");
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    let report = handle.join().await.unwrap();

    assert!(matches!(events[0], SessionEvent::Started { commands: 4, .. }));
    assert_eq!(events[1], SessionEvent::OriginSet);
    let finished: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::CommandFinished { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![0, 1, 2, 3]);
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Finished {
            id: report.id,
            status: SessionStatus::Complete
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_sessions_on_separate_ports_run_concurrently() {
    let programs = ProgramDir::new().with("stroke", STROKE_PROGRAM);
    let connector = simulator(DeviceBehavior::responsive());
    let manager = SessionManager::with_connector(Arc::clone(&connector) as _);

    let mut left = programs.config();
    left.link.port = "sim-left".to_string();
    let mut right = programs.config();
    right.link.port = "sim-right".to_string();

    let first = manager.start(left, "stroke").await.unwrap();
    let second = manager.start(right, "stroke").await.unwrap();
    assert_eq!(manager.active_count().await, 2);

    let (a, b) = tokio::join!(first.join(), second.join());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.is_complete() && b.is_complete());
    assert_ne!(a.port, b.port);
    assert_eq!(connector.connections(), 2);
}
