//! Unit Tests for Device Reply Classification
//!
//! Replies captured from several GRBL builds and clones, classified with
//! the default tokens and with case-insensitive idle matching.

use tictacplot::config::ResponseTokens;
use tictacplot::models::{DeviceStatus, StatusReport};

/// (reply, classification with default tokens)
const FIRMWARE_REPLIES: &[(&str, &str)] = &[
    // GRBL 1.1
    ("ok", "Acknowledged"),
    ("<Idle|MPos:0.000,0.000,0.000|FS:0,0>", "Idle"),
    ("<Run|MPos:12.500,3.000,-5.000|FS:1000,0>", "Busy(Run)"),
    ("<Jog|MPos:1.000,1.000,0.000|FS:500,0>", "Busy(Jog)"),
    ("<Hold:0|MPos:4.000,4.000,0.000|FS:0,0>", "Busy(Hold:0)"),
    ("<Alarm|MPos:0.000,0.000,0.000|FS:0,0>", "Busy(Alarm)"),
    // GRBL 0.9
    ("<Idle,MPos:0.000,0.000,0.000,WPos:0.000,0.000,0.000>", "Idle"),
    ("<Run,MPos:5.000,0.000,0.000,WPos:5.000,0.000,0.000>", "Busy(Run,MPos:5.000,0.000,0.000,WPos:5.000,0.000,0.000)"),
    // Clones answering in other casings
    ("OK", "Acknowledged"),
    ("Ok", "Acknowledged"),
    ("<IDLE|MPos:0.000,0.000,0.000|FS:0,0>", "Busy(IDLE)"),
    ("<idle|WPos:1.000,2.000,3.000>", "Busy(idle)"),
    // Chatter
    ("", "Silent"),
    ("   ", "Silent"),
    ("error:20", "Unrecognized(error:20)"),
    ("ALARM:1", "Unrecognized(ALARM:1)"),
    ("[MSG:Caution: Unlocked]", "Unrecognized([MSG:Caution: Unlocked])"),
];

#[test]
fn test_firmware_replies_with_default_tokens() {
    let tokens = ResponseTokens::default();
    for (reply, expected) in FIRMWARE_REPLIES {
        let status = DeviceStatus::classify(reply, &tokens);
        assert_eq!(status.describe(), *expected, "reply {:?}", reply);
    }
}

#[test]
fn test_case_insensitive_idle_accepts_clone_replies() {
    let tokens = ResponseTokens {
        idle_case_sensitive: false,
        ..ResponseTokens::default()
    };
    for reply in [
        "<IDLE|MPos:0.000,0.000,0.000|FS:0,0>",
        "<idle|WPos:1.000,2.000,3.000>",
        "<Idle|MPos:0.000,0.000,0.000|FS:0,0>",
    ] {
        assert_eq!(DeviceStatus::classify(reply, &tokens), DeviceStatus::Idle, "{}", reply);
    }
    // Still busy when the state is something else
    assert!(DeviceStatus::classify("<Run|MPos:0,0,0>", &tokens).is_busy());
}

#[test]
fn test_only_idle_and_ack_are_ready() {
    let tokens = ResponseTokens::default();
    let ready: Vec<&str> = FIRMWARE_REPLIES
        .iter()
        .map(|(reply, _)| *reply)
        .filter(|reply| DeviceStatus::classify(reply, &tokens).is_ready())
        .collect();
    assert_eq!(
        ready,
        vec![
            "ok",
            "<Idle|MPos:0.000,0.000,0.000|FS:0,0>",
            "<Idle,MPos:0.000,0.000,0.000,WPos:0.000,0.000,0.000>",
            "OK",
            "Ok",
        ]
    );
}

#[test]
fn test_positions_from_status_reports() {
    let report = StatusReport::parse("<Run|MPos:12.500,3.000,-5.000|FS:1000,0>").unwrap();
    assert_eq!(report.state, "Run");
    let position = report.position.unwrap();
    assert_eq!((position.x, position.y, position.z), (12.5, 3.0, -5.0));

    let report = StatusReport::parse("<idle|WPos:1.000,2.000,3.000>").unwrap();
    assert_eq!(report.position.map(|p| p.z), Some(3.0));

    let report = StatusReport::parse("<Hold:0|FS:0,0>").unwrap();
    assert_eq!(report.state, "Hold:0");
    assert_eq!(report.position, None);

    assert!(StatusReport::parse("ok").is_none());
    assert!(StatusReport::parse("<>").is_none());
}
