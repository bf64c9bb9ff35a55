use super::*;
use shared::protocol::{CMD_CHANNEL, DEFAULT_CHANNEL};

use crate::transport::COMMAND_ROUTE;

#[tokio::test]
async fn open_then_interruption_logs_one_entry_each() {
    let sync = Synchronizer::default();
    assert_eq!(sync.connection().await, ConnectionState::Disconnected);

    sync.connection_opened().await;
    assert_eq!(sync.connection().await, ConnectionState::Open);
    assert!(sync.connection_error(ReadyState::Connecting).await);
    assert_eq!(sync.connection().await, ConnectionState::Errored);

    assert_eq!(sync.log_lines().await, vec![EVENTS_OPENED, EVENTS_CLOSED]);
}

#[tokio::test]
async fn errors_while_open_are_not_logged() {
    let sync = Synchronizer::default();
    sync.connection_opened().await;

    assert!(!sync.connection_error(ReadyState::Open).await);
    assert!(!sync.connection_error(ReadyState::Open).await);

    assert_eq!(sync.connection().await, ConnectionState::Open);
    assert_eq!(sync.log_lines().await, vec![EVENTS_OPENED]);
}

#[tokio::test]
async fn failed_reconnect_attempts_do_not_repeat_closed_entry() {
    let sync = Synchronizer::default();
    sync.connection_opened().await;
    assert!(sync.connection_error(ReadyState::Connecting).await);
    assert!(!sync.connection_error(ReadyState::Connecting).await);
    assert!(!sync.connection_error(ReadyState::Connecting).await);
    sync.connection_opened().await;
    assert!(sync.connection_error(ReadyState::Connecting).await);

    assert_eq!(
        sync.log_lines().await,
        vec![EVENTS_OPENED, EVENTS_CLOSED, EVENTS_OPENED, EVENTS_CLOSED]
    );
}

#[tokio::test]
async fn initial_connection_failure_is_logged() {
    let sync = Synchronizer::default();
    assert!(sync.connection_error(ReadyState::Connecting).await);
    assert_eq!(sync.log_lines().await, vec![EVENTS_CLOSED]);
}

#[tokio::test]
async fn events_are_prefixed_by_channel() {
    let sync = Synchronizer::default();
    sync.record_event(&DeviceEvent::new(DEFAULT_CHANNEL, "hello!")).await;
    sync.record_event(&DeviceEvent::new(CMD_CHANNEL, "OK")).await;

    assert_eq!(sync.log_lines().await, vec!["Event: hello!", "Event[cmd]: OK"]);
}

#[tokio::test]
async fn acks_are_logged_on_one_line() {
    let sync = Synchronizer::default();
    let entry = sync.record_ack("CUT,1,10000,1600\r").await;
    assert_eq!(entry.text, "Cmd: CUT,1,10000,1600");
    assert_eq!(entry.level, LogLevel::Info);

    sync.record_ack("line one\r\nline two").await;
    assert_eq!(sync.log_lines().await[1], "Cmd: line one  line two");
}

#[tokio::test]
async fn command_failures_are_logged_as_errors() {
    let sync = Synchronizer::default();
    let error = ClientError::protocol(COMMAND_ROUTE, "acknowledgment is not UTF-8");
    let entry = sync
        .record_command_failure(&Command::raw("STP"), &error)
        .await;

    assert_eq!(entry.level, LogLevel::Error);
    assert!(entry.text.starts_with("Cmd failed: STP: "), "{}", entry.text);
    assert!(entry.text.contains("not UTF-8"));
}

#[tokio::test]
async fn button_state_follows_counter() {
    let sync = Synchronizer::new("CUT");
    assert_eq!(sync.button_state().await, None);

    let busy = sync.apply_counter(CounterState { remaining: 7 }).await;
    assert_eq!(
        busy,
        ButtonState {
            label: "7".into(),
            enabled: false
        }
    );
    assert_eq!(sync.button_state().await, Some(busy.clone()));
    assert_eq!(sync.button_state().await, Some(busy));

    let idle = sync.apply_counter(CounterState { remaining: 0 }).await;
    assert!(idle.enabled);
    assert_eq!(idle.label, "CUT");
    assert!(sync.log_entries().await.is_empty());
}

#[tokio::test]
async fn subscribers_see_updates_in_write_order() {
    let sync = Synchronizer::default();
    let mut rx = sync.subscribe();

    sync.connection_opened().await;
    sync.apply_counter(CounterState { remaining: 2 }).await;
    sync.record_ack("TC\r").await;

    assert_eq!(
        rx.recv().await.expect("update"),
        SyncUpdate::Connection(ConnectionState::Open)
    );
    match rx.recv().await.expect("update") {
        SyncUpdate::Log(entry) => {
            assert_eq!(entry.seq, 0);
            assert_eq!(entry.text, EVENTS_OPENED);
        }
        other => panic!("unexpected update: {other:?}"),
    }
    assert!(matches!(
        rx.recv().await.expect("update"),
        SyncUpdate::Button(ButtonState { enabled: false, .. })
    ));
    match rx.recv().await.expect("update") {
        SyncUpdate::Log(entry) => assert_eq!(entry.seq, 1),
        other => panic!("unexpected update: {other:?}"),
    }
}
