use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    command::Command,
    protocol::{ButtonState, DeviceEvent, DEFAULT_READY_LABEL},
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

pub mod error;
pub mod event_stream;
pub mod poller;
pub mod sse;
pub mod sync;
pub mod transport;

pub use error::{ClientError, ErrorKind};
pub use event_stream::{EventHandler, EventStreamClient, ReadyState, ReconnectPolicy};
pub use poller::{poll_once, StatusPoller, DEFAULT_POLL_INTERVAL};
pub use sync::{SyncUpdate, Synchronizer};
pub use transport::{DeviceApi, HttpDevice};

/// Extension point for reacting to the device's `OK` on the `cmd` channel.
///
/// Returning a command dispatches it like a user-issued one. The default
/// [`InertFollowUp`] never does.
pub trait FollowUp: Send + Sync {
    fn on_command_ok(&self) -> Option<Command>;
}

pub struct InertFollowUp;

impl FollowUp for InertFollowUp {
    fn on_command_ok(&self) -> Option<Command> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    pub ready_label: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            ready_label: DEFAULT_READY_LABEL.to_string(),
        }
    }
}

#[derive(Default)]
struct SessionTasks {
    poller: Option<JoinHandle<()>>,
    events: Option<JoinHandle<()>>,
}

/// Wires the command channel, status poller and event stream of one device
/// into a shared [`Synchronizer`].
pub struct DeviceSession {
    device: Arc<dyn DeviceApi>,
    sync: Arc<Synchronizer>,
    follow_up: Arc<dyn FollowUp>,
    poll_interval: Duration,
    tasks: Mutex<SessionTasks>,
}

impl DeviceSession {
    pub fn new(device: Arc<dyn DeviceApi>, options: SessionOptions) -> Arc<Self> {
        Self::new_with_follow_up(device, options, Arc::new(InertFollowUp))
    }

    pub fn new_with_follow_up(
        device: Arc<dyn DeviceApi>,
        options: SessionOptions,
        follow_up: Arc<dyn FollowUp>,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            sync: Arc::new(Synchronizer::new(options.ready_label)),
            follow_up,
            poll_interval: options.poll_interval,
            tasks: Mutex::new(SessionTasks::default()),
        })
    }

    pub fn synchronizer(&self) -> Arc<Synchronizer> {
        Arc::clone(&self.sync)
    }

    /// Submits and waits for the acknowledgment, logging either outcome.
    pub async fn submit(&self, command: Command) -> Result<String, ClientError> {
        submit_and_log(self.device.as_ref(), self.sync.as_ref(), &command).await
    }

    /// Fire-and-forget submission. Acks of concurrent commands are logged in
    /// the order they arrive, not the order they were sent.
    pub fn send_command(&self, command: Command) -> JoinHandle<Result<String, ClientError>> {
        dispatch(Arc::clone(&self.device), Arc::clone(&self.sync), command)
    }

    pub async fn poll_now(&self) -> Option<ButtonState> {
        poll_once(self.device.as_ref(), self.sync.as_ref()).await
    }

    /// Returns `false` if polling was already running.
    pub async fn start_polling(&self) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.poller.is_some() {
            return false;
        }
        let poller = StatusPoller::new(
            Arc::clone(&self.device),
            Arc::clone(&self.sync),
            self.poll_interval,
        );
        tasks.poller = Some(poller.spawn());
        info!(interval_ms = self.poll_interval.as_millis() as u64, "session: polling started");
        true
    }

    /// Starts the session's single event stream. Returns `false` if one is
    /// already running.
    pub async fn start_events(&self, stream: EventStreamClient) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.events.is_some() {
            warn!(url = %stream.url(), "session: event stream already running");
            return false;
        }
        let handler = Arc::new(SessionEvents {
            device: Arc::clone(&self.device),
            sync: Arc::clone(&self.sync),
            follow_up: Arc::clone(&self.follow_up),
        });
        info!(url = %stream.url(), "session: event stream started");
        tasks.events = Some(stream.spawn(handler));
        true
    }

    /// Stops polling and the event stream. In-flight requests are left to finish.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        abort_tasks(&mut tasks);
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        abort_tasks(self.tasks.get_mut());
    }
}

fn abort_tasks(tasks: &mut SessionTasks) {
    if let Some(poller) = tasks.poller.take() {
        poller.abort();
    }
    if let Some(events) = tasks.events.take() {
        events.abort();
    }
}

fn dispatch(
    device: Arc<dyn DeviceApi>,
    sync: Arc<Synchronizer>,
    command: Command,
) -> JoinHandle<Result<String, ClientError>> {
    tokio::spawn(async move { submit_and_log(device.as_ref(), sync.as_ref(), &command).await })
}

async fn submit_and_log(
    device: &dyn DeviceApi,
    sync: &Synchronizer,
    command: &Command,
) -> Result<String, ClientError> {
    match device.submit(command).await {
        Ok(ack) => {
            sync.record_ack(&ack).await;
            Ok(ack)
        }
        Err(error) => {
            warn!(%command, %error, kind = ?error.kind(), "command: submission failed");
            sync.record_command_failure(command, &error).await;
            Err(error)
        }
    }
}

struct SessionEvents {
    device: Arc<dyn DeviceApi>,
    sync: Arc<Synchronizer>,
    follow_up: Arc<dyn FollowUp>,
}

#[async_trait]
impl EventHandler for SessionEvents {
    async fn on_open(&self) {
        self.sync.connection_opened().await;
    }

    async fn on_message(&self, event: DeviceEvent) {
        if !event.is_subscribed() {
            debug!(channel = %event.channel, "events: ignoring unsubscribed channel");
            return;
        }
        self.sync.record_event(&event).await;
        if event.is_command_ok() {
            if let Some(next) = self.follow_up.on_command_ok() {
                info!(command = %next, "events: dispatching follow-up command");
                dispatch(Arc::clone(&self.device), Arc::clone(&self.sync), next);
            }
        }
    }

    async fn on_error(&self, ready_state: ReadyState, _error: &ClientError) {
        self.sync.connection_error(ready_state).await;
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
