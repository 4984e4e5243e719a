//! Budget model: accumulates active and rest time and turns it into metrics.
//!
//! The scheduler only talks to the [`Model`] trait; [`BudgetModel`] is the
//! implementation the agent ships with.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use timeflash_shared::api::Change;
use timeflash_shared::domain::{DailyValues, REST, SESSION, duration_secs};
use timeflash_shared::{IdleState, Metric, Metrics, Time};

use crate::AppError;

pub const DAILY: &str = "daily";
const FIRST_WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const ADVISE_RATIO: f64 = 0.5;

/// A model mutation, stamped with the time it was received.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvent {
    pub time: Time,
    pub change: Change,
}

/// What the scheduler needs from the budget model.
pub trait Model: Send {
    /// `None` until persisted state has been loaded.
    fn state(&self) -> Option<&ModelState>;
    fn metrics(&self, time: &Time) -> Result<Metrics, AppError>;
    /// Keep-active periods elapsed since the last activity report; infinite
    /// while the user is not active.
    fn periods_since_active(&self, time: &Time) -> f64;
    fn update(&mut self, event: ModelEvent) -> Result<(), AppError>;
    fn idle_delay(&self) -> Duration;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(with = "duration_secs")]
    pub session: Duration,
    #[serde(with = "duration_secs")]
    pub rest: Duration,
    #[serde(with = "duration_secs")]
    pub daily: Duration,
}

impl Targets {
    fn get_mut(&mut self, name: &str) -> Option<&mut Duration> {
        match name {
            SESSION => Some(&mut self.session),
            REST => Some(&mut self.rest),
            DAILY => Some(&mut self.daily),
            _ => None,
        }
    }
}

/// Persisted model state. Always written as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelState {
    pub monitored: bool,
    pub first_week: bool,
    pub daily_values: DailyValues,
    pub targets: Targets,
    pub idle_state: IdleState,
    pub last_active: Time,
    pub idle_since: Option<Time>,
    /// Active time accumulated in the current session.
    #[serde(with = "duration_secs")]
    pub session: Duration,
    pub created: Time,
    pub last_update: Time,
}

impl ModelState {
    pub fn new(time: Time, targets: Targets) -> Self {
        Self {
            monitored: true,
            first_week: true,
            daily_values: DailyValues::new(),
            targets,
            idle_state: IdleState::Active,
            last_active: time,
            idle_since: None,
            session: Duration::ZERO,
            created: time,
            last_update: time,
        }
    }
}

pub struct BudgetModel {
    state: Option<ModelState>,
    idle_delay: Duration,
    keep_active_period: Duration,
}

impl BudgetModel {
    pub fn new(idle_delay: Duration, keep_active_period: Duration) -> Self {
        Self {
            state: None,
            idle_delay,
            keep_active_period,
        }
    }

    pub fn load(&mut self, state: ModelState) {
        self.state = Some(state);
    }

    pub fn keep_active_period(&self) -> Duration {
        self.keep_active_period
    }

    fn loaded(&self) -> Result<&ModelState, AppError> {
        self.state
            .as_ref()
            .ok_or_else(|| AppError::Model("state not loaded".into()))
    }

    /// End of the current activity window, if the user counts as active.
    fn active_until(&self, state: &ModelState) -> Option<Time> {
        (state.monitored && state.idle_state == IdleState::Active)
            .then(|| state.last_active.plus(self.keep_active_period))
    }

    fn active_between(&self, state: &ModelState, from: &Time, to: &Time) -> Duration {
        match self.active_until(state) {
            Some(until) => (*to).min(until).since(from),
            None => Duration::ZERO,
        }
    }

    /// Start of the current rest stretch: the reported idle time, or the
    /// lapse of the activity window when no report arrived.
    fn rest_start(&self, state: &ModelState, time: &Time) -> Option<Time> {
        if state.idle_since.is_some() {
            return state.idle_since;
        }
        let lapsed = state.last_active.plus(self.keep_active_period);
        (state.idle_state == IdleState::Active && lapsed <= *time).then_some(lapsed)
    }
}

fn ratio(accumulated: Duration, target: Duration) -> f64 {
    if target.is_zero() {
        return 0.0;
    }
    accumulated.as_secs_f64() / target.as_secs_f64()
}

impl Model for BudgetModel {
    fn state(&self) -> Option<&ModelState> {
        self.state.as_ref()
    }

    fn metrics(&self, time: &Time) -> Result<Metrics, AppError> {
        let state = self.loaded()?;
        let pending = self.active_between(state, &state.last_update, time);
        let session = state.session + pending;
        let today = state
            .daily_values
            .get(&time.day_key())
            .copied()
            .unwrap_or(0.0)
            + pending.as_secs_f64();
        let rest = self
            .rest_start(state, time)
            .map_or(Duration::ZERO, |start| time.since(&start));

        let t = &state.targets;
        let session_ratio = ratio(session, t.session);
        let daily_ratio = if t.daily.is_zero() {
            0.0
        } else {
            today / t.daily.as_secs_f64()
        };
        let rest_ratio = ratio(rest, t.rest);
        let metrics = Metrics::new(vec![
            Metric::new(SESSION, t.session, session_ratio, session_ratio >= ADVISE_RATIO),
            Metric::new(DAILY, t.daily, daily_ratio, daily_ratio >= ADVISE_RATIO),
            Metric::new(REST, t.rest, rest_ratio, rest_ratio > 0.0),
        ])?;
        Ok(metrics)
    }

    fn periods_since_active(&self, time: &Time) -> f64 {
        match &self.state {
            Some(state) if state.idle_state == IdleState::Active => {
                time.since(&state.last_active).as_secs_f64()
                    / self.keep_active_period.as_secs_f64()
            }
            _ => f64::INFINITY,
        }
    }

    fn update(&mut self, event: ModelEvent) -> Result<(), AppError> {
        let ModelEvent { time, change } = event;
        let state = self.loaded()?;

        let active = self.active_between(state, &state.last_update, &time);
        let rest_start = self.rest_start(state, &time);

        let mut next = state.clone();
        next.session += active;
        *next.daily_values.entry(time.day_key()).or_insert(0.0) += active.as_secs_f64();

        match change {
            Change::IdleState(IdleState::Active) => {
                if let Some(start) = rest_start
                    && time.since(&start) >= next.targets.rest
                {
                    next.session = Duration::ZERO;
                }
                next.idle_since = None;
                next.last_active = time;
                next.idle_state = IdleState::Active;
            }
            Change::IdleState(idle) => {
                if next.idle_since.is_none() {
                    next.idle_since = Some(rest_start.unwrap_or(time));
                }
                next.idle_state = idle;
            }
            Change::Monitored(monitored) => next.monitored = monitored,
            Change::Target { name, seconds } => {
                let target = Duration::try_from_secs_f64(seconds)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .ok_or_else(|| AppError::Model(format!("invalid target {seconds} for {name}")))?;
                let slot = next
                    .targets
                    .get_mut(&name)
                    .ok_or_else(|| AppError::Model(format!("unknown metric {name}")))?;
                *slot = target;
            }
        }

        next.last_update = time;
        next.first_week = time.since(&next.created) < FIRST_WEEK;
        self.state = Some(next);
        Ok(())
    }

    fn idle_delay(&self) -> Duration {
        self.idle_delay
    }
}
