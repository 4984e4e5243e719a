//! Single-flight tick loop driving icon updates, broadcasts and flashes.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use timeflash_shared::api::{Change, DetailsMessage, FlashMessage, PORT_DETAILS, PORT_FLASH};
use timeflash_shared::{IdleState, Time};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::policy::NotificationPolicy;
use crate::AppError;
use crate::flash::FlashController;
use crate::model::{Model, ModelEvent, ModelState};
use crate::platform::Platform;
use crate::ports::PortHub;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Keep-active periods since the last activity report in which a tick
/// re-reports activity, so an active user never lapses between OS signals.
pub const KEEP_ALIVE_WINDOW: Range<f64> = 0.8..1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The model has no state yet; nothing happened.
    NotLoaded,
    /// A tick was already running.
    Reentrant,
    Ran { rearmed: bool },
}

struct SchedulerState {
    ticking: bool,
    policy: NotificationPolicy,
    rearm_at: Option<Instant>,
}

type Clock = Box<dyn Fn() -> Time + Send>;

pub struct Scheduler {
    model: Box<dyn Model>,
    platform: Arc<dyn Platform>,
    flash: FlashController,
    ports: PortHub,
    state: SchedulerState,
    clock: Clock,
    dirty: bool,
}

impl Scheduler {
    pub fn new(
        model: Box<dyn Model>,
        platform: Arc<dyn Platform>,
        flash: FlashController,
        ports: PortHub,
    ) -> Self {
        let policy = NotificationPolicy::new(model.idle_delay());
        Self {
            model,
            platform,
            flash,
            ports,
            state: SchedulerState {
                ticking: false,
                policy,
                rearm_at: None,
            },
            clock: Box::new(Time::now),
            dirty: false,
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> Time + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn model_state(&self) -> Option<&ModelState> {
        self.model.state()
    }

    pub fn policy(&self) -> &NotificationPolicy {
        &self.state.policy
    }

    /// When the next tick is due, if one is armed.
    pub fn rearm_deadline(&self) -> Option<Instant> {
        self.state.rearm_at
    }

    /// Whether the model changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn tick(&mut self) -> Result<TickOutcome, AppError> {
        if self.model.state().is_none() {
            trace!("tick skipped; state not loaded");
            return Ok(TickOutcome::NotLoaded);
        }
        if self.state.ticking {
            return Ok(TickOutcome::Reentrant);
        }
        self.state.ticking = true;
        self.state.rearm_at = None;
        let result = self.run_tick();
        self.state.ticking = false;
        result.map(|rearmed| TickOutcome::Ran { rearmed })
    }

    fn run_tick(&mut self) -> Result<bool, AppError> {
        let time = (self.clock)();
        let (monitored, first_week, daily_values) = {
            let state = self
                .model
                .state()
                .ok_or_else(|| AppError::Model("state not loaded".into()))?;
            (state.monitored, state.first_week, state.daily_values.clone())
        };
        let metrics = self.model.metrics(&time)?;

        let icon = FlashMessage {
            monitored,
            metrics: metrics.advised(),
            badge: self.flash.errors().badge(),
        };
        self.platform.set_icon(&icon);

        let policy = &mut self.state.policy;
        if let Some(close_after) = policy.maybe_flash_attained(&time, monitored, &metrics) {
            debug!(?close_after, "budget attained; flashing");
            self.flash.trigger(close_after);
        }
        if let Some(close_after) = policy.maybe_flash_unmonitored(&time, monitored, &metrics)? {
            debug!(?close_after, "unmonitored too long; flashing");
            self.flash.trigger(close_after);
        }

        let rest_attained = metrics.rest().attained;
        self.ports.send(PORT_FLASH, &icon)?;
        self.ports.send(
            PORT_DETAILS,
            &DetailsMessage {
                monitored,
                metrics,
                first_week,
                daily_values,
            },
        )?;

        let periods = self.model.periods_since_active(&time);
        if KEEP_ALIVE_WINDOW.contains(&periods) {
            trace!(periods, "keep-alive nudge");
            self.update(ModelEvent {
                time,
                change: Change::IdleState(IdleState::Active),
            })?;
        }

        if rest_attained {
            debug!("rest attained; not re-arming");
            return Ok(false);
        }
        self.state.rearm_at = Some(Instant::now() + TICK_INTERVAL);
        Ok(true)
    }

    /// Stamps `change` with the current time and applies it.
    pub fn apply(&mut self, change: Change) -> Result<(), AppError> {
        let time = (self.clock)();
        self.update(ModelEvent { time, change })
    }

    /// Applies a model update, then ticks so listeners see the result.
    pub fn update(&mut self, event: ModelEvent) -> Result<(), AppError> {
        self.model.update(event)?;
        self.dirty = true;
        self.tick()?;
        Ok(())
    }
}
