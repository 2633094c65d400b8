//! Contract Tests for the Dispatcher
//!
//! Bounded attempts with a wall-clock response window per attempt.

use std::collections::HashSet;
use std::time::Duration;

use tictacplot::link::{ChannelLink, DeviceBehavior, DeviceEnd, LineTransport, SimulatedDevice};
use tictacplot::models::{Command, DispatchOutcome};
use tictacplot::{Config, Dispatcher, StatusGate};
use tokio::time::Instant;

fn config_with_retries(retry_max: u32) -> Config {
    let mut config = Config::fast();
    config.dispatch.retry_max = retry_max;
    config
}

/// Board that answers every line with `reply`
fn echo_board(mut end: DeviceEnd, reply: &'static str) {
    tokio::spawn(async move {
        while end.from_host.recv().await.is_some() {
            end.reply(reply);
        }
    });
}

#[tokio::test(start_paused = true)]
async fn test_attempts_never_exceed_retry_max() {
    for retry_max in [1, 3, 5] {
        let (mut link, end) = ChannelLink::pair("sim0");
        SimulatedDevice::new(DeviceBehavior::silent()).spawn(end);
        let dispatcher = Dispatcher::new(&config_with_retries(retry_max));

        let outcome = dispatcher
            .send(&mut link, &Command::new(1, "G1 X5"))
            .await
            .unwrap();
        assert_eq!(outcome.attempts(), retry_max);
        assert!(!outcome.is_executed());
        assert_eq!(link.stats().lines_written, u64::from(retry_max));
    }
}

#[tokio::test(start_paused = true)]
async fn test_ack_on_nth_attempt() {
    for ignored in 0..4 {
        let (mut link, end) = ChannelLink::pair("sim0");
        let behavior = DeviceBehavior {
            ignore_writes: ignored,
            ..DeviceBehavior::default()
        };
        SimulatedDevice::new(behavior).spawn(end);
        let dispatcher = Dispatcher::new(&Config::fast());

        let outcome = dispatcher
            .send(&mut link, &Command::new(1, "G1 X5"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Executed {
                attempts: ignored + 1
            }
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_is_exact_on_last_attempt() {
    let (mut link, end) = ChannelLink::pair("sim0");
    let behavior = DeviceBehavior {
        ignore_writes: 4,
        ..DeviceBehavior::default()
    };
    SimulatedDevice::new(behavior).spawn(end);
    let dispatcher = Dispatcher::new(&config_with_retries(5));

    let outcome = dispatcher
        .send(&mut link, &Command::new(1, "G1 X5"))
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Executed { attempts: 5 });
}

#[tokio::test(start_paused = true)]
async fn test_chatter_does_not_extend_window() {
    let (mut link, end) = ChannelLink::pair("sim0");
    let config = config_with_retries(1);
    let dispatcher = Dispatcher::new(&config);

    // Keeps talking, never acknowledges
    tokio::spawn(async move {
        let end = end;
        loop {
            if !end.reply("[MSG:Check door]") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let started = Instant::now();
    let outcome = dispatcher
        .send(&mut link, &Command::new(1, "G1 X5"))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(
        outcome,
        DispatchOutcome::Abandoned {
            attempts: 1,
            last_response: Some("[MSG:Check door]".to_string())
        }
    );
    let budget = config.dispatch.write_settle() + config.dispatch.response_window();
    assert!(elapsed >= config.dispatch.response_window());
    assert!(elapsed <= budget + Duration::from_millis(20), "took {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_only_between_attempts() {
    let (mut link, end) = ChannelLink::pair("sim0");
    SimulatedDevice::new(DeviceBehavior::silent()).spawn(end);
    let mut config = config_with_retries(3);
    config.dispatch.retry_backoff_ms = 50;
    let dispatcher = Dispatcher::new(&config);

    let started = Instant::now();
    dispatcher
        .send(&mut link, &Command::new(1, "G1 X5"))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    let per_attempt = config.dispatch.write_settle() + config.dispatch.response_window();
    let expected = per_attempt * 3 + config.dispatch.retry_backoff() * 2;
    assert!(elapsed >= expected, "took {:?}", elapsed);
    assert!(elapsed < expected + config.dispatch.retry_backoff(), "took {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_ack_token_is_case_insensitive_by_default() {
    let (mut link, end) = ChannelLink::pair("sim0");
    echo_board(end, "OK");
    let dispatcher = Dispatcher::new(&Config::fast());

    let outcome = dispatcher
        .send(&mut link, &Command::new(1, "G1 X5"))
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Executed { attempts: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_case_sensitive_ack_rejects_other_casing() {
    let (mut link, end) = ChannelLink::pair("sim0");
    echo_board(end, "OK");
    let mut config = config_with_retries(2);
    config.responses.ack_case_sensitive = true;
    let dispatcher = Dispatcher::new(&config);

    let outcome = dispatcher
        .send(&mut link, &Command::new(1, "G1 X5"))
        .await
        .unwrap();
    assert_eq!(outcome.attempts(), 2);
    assert!(!outcome.is_executed());
}

#[tokio::test(start_paused = true)]
async fn test_status_query_ack_is_not_taken_for_command_ack() {
    let (mut link, end) = ChannelLink::pair("sim0");
    let behavior = DeviceBehavior {
        ack_status_queries: true,
        never_ack: HashSet::from(["G1 X1".to_string()]),
        ..DeviceBehavior::default()
    };
    SimulatedDevice::new(behavior).spawn(end);
    let config = config_with_retries(3);

    // Board answers `<Idle|...>` then `ok` to the query
    let report = StatusGate::new(&config).await_ready(&mut link).await.unwrap();
    assert_eq!(report.polls, 1);

    let outcome = Dispatcher::new(&config)
        .send(&mut link, &Command::new(1, "G1 X1"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Abandoned {
            attempts: 3,
            last_response: None
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_status_query_ack_does_not_skip_retries() {
    let (mut link, end) = ChannelLink::pair("sim0");
    let behavior = DeviceBehavior {
        ack_status_queries: true,
        ignore_writes: 1,
        ..DeviceBehavior::default()
    };
    SimulatedDevice::new(behavior).spawn(end);
    let config = Config::fast();

    StatusGate::new(&config).await_ready(&mut link).await.unwrap();
    let outcome = Dispatcher::new(&config)
        .send(&mut link, &Command::new(1, "G1 X5"))
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Executed { attempts: 2 });
}
