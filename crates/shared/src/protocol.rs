use std::fmt;

use serde::{Deserialize, Serialize};

/// Default caption of the primary cut control when the device is idle.
pub const DEFAULT_READY_LABEL: &str = "TNIJ";

/// Named event channel the device uses for command completion notices.
pub const CMD_CHANNEL: &str = "cmd";

/// Channel name of events sent without an `event:` field.
pub const DEFAULT_CHANNEL: &str = "message";

/// Payload on [`CMD_CHANNEL`] signalling that a command finished.
pub const CMD_OK: &str = "OK";

/// Body of `GET /cnt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterResponse {
    pub cnt: u32,
}

/// Number of cut cycles still queued on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterState {
    pub remaining: u32,
}

impl From<CounterResponse> for CounterState {
    fn from(value: CounterResponse) -> Self {
        Self {
            remaining: value.cnt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub channel: String,
    pub data: String,
}

impl DeviceEvent {
    pub fn new(channel: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            data: data.into(),
        }
    }

    pub fn is_default_channel(&self) -> bool {
        self.channel == DEFAULT_CHANNEL
    }

    /// The device's own channels: the unnamed default and `cmd`. Anything
    /// else is not listened to.
    pub fn is_subscribed(&self) -> bool {
        self.is_default_channel() || self.channel == CMD_CHANNEL
    }

    pub fn is_command_ok(&self) -> bool {
        self.channel == CMD_CHANNEL && self.data == CMD_OK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Open,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonState {
    pub label: String,
    pub enabled: bool,
}

impl ButtonState {
    /// Idle device: enabled with the ready caption. Busy device: disabled, showing the backlog.
    pub fn derive(counter: CounterState, ready_label: &str) -> Self {
        if counter.remaining == 0 {
            Self {
                label: ready_label.to_string(),
                enabled: true,
            }
        } else {
            Self {
                label: counter.remaining.to_string(),
                enabled: false,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Error,
}

/// One line of the visible device log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub level: LogLevel,
    pub text: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
