//! The one stateful component: counter, connection state and the visible log.

use shared::{
    command::Command,
    protocol::{
        ButtonState, ConnectionState, CounterState, DeviceEvent, LogEntry, LogLevel,
        DEFAULT_READY_LABEL,
    },
};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::{error::ClientError, event_stream::ReadyState};

pub const EVENTS_OPENED: &str = "Events Opened";
pub const EVENTS_CLOSED: &str = "Events Closed";

/// Change notifications for whatever renders the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    Log(LogEntry),
    Button(ButtonState),
    Connection(ConnectionState),
}

#[derive(Default)]
struct SyncState {
    counter: Option<CounterState>,
    connection: ConnectionState,
    log: Vec<LogEntry>,
    next_seq: u64,
}

pub struct Synchronizer {
    ready_label: String,
    inner: Mutex<SyncState>,
    updates: broadcast::Sender<SyncUpdate>,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_READY_LABEL)
    }
}

impl Synchronizer {
    pub fn new(ready_label: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(1024);
        Self {
            ready_label: ready_label.into(),
            inner: Mutex::new(SyncState::default()),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.updates.subscribe()
    }

    pub fn ready_label(&self) -> &str {
        &self.ready_label
    }

    /// Replaces the counter wholesale and returns the re-derived button state.
    pub async fn apply_counter(&self, counter: CounterState) -> ButtonState {
        let button = ButtonState::derive(counter, &self.ready_label);
        let mut guard = self.inner.lock().await;
        guard.counter = Some(counter);
        // Notify under the lock so subscribers see updates in write order.
        let _ = self.updates.send(SyncUpdate::Button(button.clone()));
        button
    }

    pub async fn counter(&self) -> Option<CounterState> {
        self.inner.lock().await.counter
    }

    /// `None` until the first successful poll.
    pub async fn button_state(&self) -> Option<ButtonState> {
        self.counter()
            .await
            .map(|counter| ButtonState::derive(counter, &self.ready_label))
    }

    pub async fn connection(&self) -> ConnectionState {
        self.inner.lock().await.connection
    }

    pub async fn record_ack(&self, ack: &str) -> LogEntry {
        self.append(LogLevel::Info, format!("Cmd: {}", one_line(ack))).await
    }

    pub async fn record_command_failure(&self, command: &Command, error: &ClientError) -> LogEntry {
        self.append(LogLevel::Error, format!("Cmd failed: {command}: {error}"))
            .await
    }

    /// Logs a message from one of the subscribed channels.
    pub async fn record_event(&self, event: &DeviceEvent) -> LogEntry {
        let text = if event.is_default_channel() {
            format!("Event: {}", one_line(&event.data))
        } else {
            format!("Event[{}]: {}", event.channel, one_line(&event.data))
        };
        self.append(LogLevel::Info, text).await
    }

    pub async fn connection_opened(&self) {
        self.set_connection(ConnectionState::Open).await;
        self.append(LogLevel::Info, EVENTS_OPENED.to_string()).await;
    }

    /// Logs a lost connection once per interruption. Errors observed while the
    /// stream is still open are not interruptions and leave no trace in the log.
    pub async fn connection_error(&self, ready_state: ReadyState) -> bool {
        if ready_state == ReadyState::Open {
            return false;
        }
        let previous = self.set_connection(ConnectionState::Errored).await;
        if previous == ConnectionState::Errored {
            debug!("events: reconnect attempt failed");
            return false;
        }
        self.append(LogLevel::Info, EVENTS_CLOSED.to_string()).await;
        true
    }

    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.inner.lock().await.log.clone()
    }

    pub async fn log_lines(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .log
            .iter()
            .map(|entry| entry.text.clone())
            .collect()
    }

    async fn set_connection(&self, state: ConnectionState) -> ConnectionState {
        let mut guard = self.inner.lock().await;
        let previous = std::mem::replace(&mut guard.connection, state);
        if previous != state {
            let _ = self.updates.send(SyncUpdate::Connection(state));
        }
        previous
    }

    async fn append(&self, level: LogLevel, text: String) -> LogEntry {
        let mut guard = self.inner.lock().await;
        let entry = LogEntry {
            seq: guard.next_seq,
            level,
            text,
        };
        guard.next_seq += 1;
        guard.log.push(entry.clone());
        let _ = self.updates.send(SyncUpdate::Log(entry.clone()));
        entry
    }
}

// Device replies end in "\r"; keep each log entry on one line.
fn one_line(text: &str) -> String {
    text.trim_end_matches(['\r', '\n'])
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
