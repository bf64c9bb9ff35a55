use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use client_core::{ReconnectPolicy, SessionOptions};
use serde::Deserialize;
use shared::{command::DEFAULT_FEED_SPEED, protocol::DEFAULT_READY_LABEL};

pub const DEFAULT_CONFIG_FILE: &str = "wirecutter.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub device_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub feed_speed: f64,
    pub reference: f64,
    pub ready_label: String,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Address of the rig's own access point.
            device_url: "http://192.168.4.1".into(),
            poll_interval_ms: 1000,
            request_timeout_ms: 5000,
            feed_speed: DEFAULT_FEED_SPEED,
            reference: 100.0,
            ready_label: DEFAULT_READY_LABEL.into(),
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 30_000,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            ready_label: self.ready_label.clone(),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms)),
            ..ReconnectPolicy::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    device_url: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    feed_speed: Option<f64>,
    reference: Option<f64>,
    ready_label: Option<String>,
    reconnect_initial_ms: Option<u64>,
    reconnect_max_ms: Option<u64>,
    log_filter: Option<String>,
}

/// Defaults, then the config file, then environment variables.
///
/// An explicitly requested file must exist; the default `wirecutter.toml` is optional.
pub fn load_settings(explicit_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            apply_file(&mut settings, file_cfg);
        }
        Err(err) if explicit_path.is_none() && err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.device_url {
        settings.device_url = v;
    }
    if let Some(v) = file_cfg.poll_interval_ms {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = file_cfg.request_timeout_ms {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = file_cfg.feed_speed {
        settings.feed_speed = v;
    }
    if let Some(v) = file_cfg.reference {
        settings.reference = v;
    }
    if let Some(v) = file_cfg.ready_label {
        settings.ready_label = v;
    }
    if let Some(v) = file_cfg.reconnect_initial_ms {
        settings.reconnect_initial_ms = v;
    }
    if let Some(v) = file_cfg.reconnect_max_ms {
        settings.reconnect_max_ms = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
}

// Each setting reads WIRECUTTER_<NAME>, then APP__<NAME>; the latter wins.
fn env_value(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(&format!("APP__{name}")).or_else(|| lookup(&format!("WIRECUTTER_{name}")))
}

fn env_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_value(lookup, name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value '{raw}' for {name}"))
        })
        .transpose()
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(v) = env_value(&lookup, "DEVICE_URL") {
        settings.device_url = v;
    }
    if let Some(v) = env_parsed(&lookup, "POLL_INTERVAL_MS")? {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = env_parsed(&lookup, "REQUEST_TIMEOUT_MS")? {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = env_parsed(&lookup, "FEED_SPEED")? {
        settings.feed_speed = v;
    }
    if let Some(v) = env_parsed(&lookup, "REFERENCE")? {
        settings.reference = v;
    }
    if let Some(v) = env_value(&lookup, "READY_LABEL") {
        settings.ready_label = v;
    }
    if let Some(v) = env_parsed(&lookup, "RECONNECT_INITIAL_MS")? {
        settings.reconnect_initial_ms = v;
    }
    if let Some(v) = env_parsed(&lookup, "RECONNECT_MAX_MS")? {
        settings.reconnect_max_ms = v;
    }
    if let Some(v) = env_value(&lookup, "LOG") {
        settings.log_filter = v;
    }
    Ok(())
}
