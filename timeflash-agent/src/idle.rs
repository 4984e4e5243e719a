//! Feeds OS idle state into the agent.

use std::sync::Arc;
use std::time::Duration;

use timeflash_shared::IdleState;
use timeflash_shared::api::Change;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::agent::AgentEvent;
use crate::platform::Platform;
use crate::report::ErrorReporter;

pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls the platform and reports the initial state plus every transition.
pub struct IdleBridge {
    platform: Arc<dyn Platform>,
    threshold: Duration,
    tx: mpsc::Sender<AgentEvent>,
    errors: ErrorReporter,
}

impl IdleBridge {
    pub fn new(
        platform: Arc<dyn Platform>,
        threshold: Duration,
        tx: mpsc::Sender<AgentEvent>,
        errors: ErrorReporter,
    ) -> Self {
        Self {
            platform,
            threshold,
            tx,
            errors,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = self.run() => {}
            }
            debug!("idle bridge stopped");
        })
    }

    async fn run(self) {
        let mut last: Option<IdleState> = None;
        let mut failing = false;
        let mut interval = tokio::time::interval(IDLE_POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.platform.query_idle(self.threshold).await {
                Ok(state) => {
                    failing = false;
                    if last == Some(state) {
                        continue;
                    }
                    debug!(%state, "idle state changed");
                    last = Some(state);
                    let event = AgentEvent::Change(Change::IdleState(state));
                    if self.tx.send(event).await.is_err() {
                        return;
                    }
                }
                Err(e) if failing => warn!(error=%e, "idle query still failing"),
                Err(e) => {
                    failing = true;
                    self.errors.report(&e);
                }
            }
        }
    }
}
