use std::future::pending;
use std::time::Duration;

use timeflash_shared::Time;
use timeflash_shared::api::Change;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scheduler::Scheduler;
use crate::config::AgentConfig;
use crate::flash::FlashController;
use crate::idle::IdleBridge;
use crate::model::{BudgetModel, ModelState};
use crate::ports::{self, PortHub, PortState};
use crate::report::ErrorReporter;
use crate::store::StateStore;
use crate::{AppError, platform};

const EVENT_QUEUE: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Everything the agent core reacts to arrives as one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Change(Change),
    PortConnected(String),
}

/// Entry point for the agent in the current session.
pub async fn run(cfg: AgentConfig) -> Result<(), AppError> {
    let plat = platform::detect(&cfg).await?;
    plat.initialize_process();
    info!("platform selected: linux");

    let hub = PortHub::default();
    let errors = ErrorReporter::new(plat.clone()).with_ports(hub.clone());
    let store = StateStore::new(cfg.state_path()?);
    let state = match store.load().await? {
        Some(state) => state,
        None => {
            info!(path=?store.path(), "no stored state; starting fresh");
            ModelState::new(Time::now(), cfg.initial_targets())
        }
    };
    let mut model = BudgetModel::new(cfg.idle_delay(), cfg.keep_active_period());
    model.load(state);

    let flash = FlashController::new(plat.clone(), errors.clone());
    let scheduler = Scheduler::new(Box::new(model), plat.clone(), flash, hub.clone());

    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let cancel = CancellationToken::new();

    let idle = IdleBridge::new(plat.clone(), cfg.idle_delay(), tx.clone(), errors.clone())
        .spawn(cancel.child_token());

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    let server_cancel = cancel.child_token();
    let server_errors = errors.clone();
    let server = tokio::spawn(async move {
        let state = PortState { hub, events: tx };
        if let Err(e) = ports::serve(listener, state, server_cancel).await {
            server_errors.report(&e);
        }
    });

    let ctx = ActorContext {
        scheduler,
        store,
        errors,
    };
    let mut handle = tokio::spawn(run_actor(ctx, rx, cancel.child_token()));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received; requesting agent to stop");
        }
        _ = &mut handle => {
            info!("agent loop finished");
        }
    }
    cancel.cancel();

    if !handle.is_finished() && tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
        warn!("shutdown: agent loop did not stop in time; state may be stale");
    }
    for task in [server, idle] {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("shutdown: task did not stop in time");
        }
    }
    Ok(())
}

pub struct ActorContext {
    pub scheduler: Scheduler,
    pub store: StateStore,
    pub errors: ErrorReporter,
}

/// Handles events one at a time until cancelled or every sender is gone.
/// Model changes are persisted after each event and once more on exit.
pub async fn run_actor(
    ctx: ActorContext,
    mut rx: mpsc::Receiver<AgentEvent>,
    cancel: CancellationToken,
) -> ActorContext {
    let ActorContext {
        mut scheduler,
        mut store,
        errors,
    } = ctx;

    if let Err(e) = scheduler.tick() {
        errors.report(&e);
    }

    loop {
        let deadline = scheduler.rearm_deadline();
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                None => break,
                Some(AgentEvent::Change(change)) => {
                    debug!(?change, "applying change");
                    scheduler.apply(change)
                }
                Some(AgentEvent::PortConnected(name)) => {
                    debug!(port=%name, "port connected; ticking");
                    scheduler.tick().map(drop)
                }
            },
            _ = wait_rearm(deadline) => scheduler.tick().map(drop),
        };
        if let Err(e) = result {
            errors.report(&e);
        }
        if scheduler.take_dirty() {
            let state = scheduler.model_state().cloned();
            persist(state, &mut store, &errors).await;
        }
    }

    let state = scheduler.model_state().cloned();
    persist(state, &mut store, &errors).await;
    debug!("agent loop stopped");
    ActorContext {
        scheduler,
        store,
        errors,
    }
}

async fn wait_rearm(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

/// Takes an owned copy so the scheduler is never borrowed across the write.
async fn persist(state: Option<ModelState>, store: &mut StateStore, errors: &ErrorReporter) {
    let Some(state) = state else {
        return;
    };
    if let Err(e) = store.save(&state).await {
        errors.report(&e);
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            warn!("could not install signal handlers; running until stopped");
            return pending().await;
        };
        tokio::select! {
            _ = sigint.recv() => {
                info!("shutdown: received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("shutdown: received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return pending().await;
        }
        info!("shutdown: received ctrl_c");
    }
}
