use std::{sync::Arc, time::Duration};

use shared::protocol::ButtonState;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{sync::Synchronizer, transport::DeviceApi};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Periodically refreshes the remaining-work counter.
///
/// Every tick spawns its own request. A slow request neither delays nor
/// cancels later ticks, so whichever request completes last decides the
/// counter.
pub struct StatusPoller {
    device: Arc<dyn DeviceApi>,
    sync: Arc<Synchronizer>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(device: Arc<dyn DeviceApi>, sync: Arc<Synchronizer>, interval: Duration) -> Self {
        Self {
            device,
            sync,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Ticks until aborted. The first tick fires one interval after start.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let device = Arc::clone(&self.device);
            let sync = Arc::clone(&self.sync);
            tokio::spawn(async move {
                poll_once(device.as_ref(), sync.as_ref()).await;
            });
        }
    }
}

/// One poll tick. Failures keep the last known counter and are only traced.
pub async fn poll_once(device: &dyn DeviceApi, sync: &Synchronizer) -> Option<ButtonState> {
    match device.fetch_counter().await {
        Ok(counter) => {
            debug!(remaining = counter.remaining, "poll: counter updated");
            Some(sync.apply_counter(counter).await)
        }
        Err(error) => {
            warn!(%error, kind = ?error.kind(), "poll: tick failed, keeping last counter");
            None
        }
    }
}
