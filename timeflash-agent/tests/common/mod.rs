#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use time::UtcOffset;
use timeflash_agent::AppError;
use timeflash_agent::model::{Model, ModelEvent, ModelState, Targets};
use timeflash_agent::platform::{FlashId, Platform};
use timeflash_shared::api::{Change, FlashMessage};
use timeflash_shared::{IdleState, Metric, Metrics, Time};

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Fixed UTC time `s` seconds after the epoch.
pub fn at(s: u64) -> Time {
    Time::from_unix_millis(i128::from(s) * 1000, UtcOffset::UTC)
}

pub fn targets() -> Targets {
    Targets {
        session: secs(1500),
        rest: secs(300),
        daily: secs(8 * 3600),
    }
}

pub fn metrics(session: f64, daily: f64, rest: f64) -> Metrics {
    Metrics::new(vec![
        Metric::new("session", secs(1500), session, session >= 0.5),
        Metric::new("daily", secs(8 * 3600), daily, daily >= 0.5),
        Metric::new("rest", secs(300), rest, rest > 0.0),
    ])
    .unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(FlashId),
    Close(FlashId),
    Icon { monitored: bool, advised: Vec<String> },
    Badge { text: String, color: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseBehavior {
    Ok,
    NotFound,
    Fail,
}

/// Records every call. Idle queries pop scripted answers; the last one
/// repeats forever.
pub struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU32,
    close: Mutex<CloseBehavior>,
    fail_open: Mutex<bool>,
    panic_open: Mutex<bool>,
    idle: Mutex<VecDeque<Result<IdleState, String>>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(0),
            close: Mutex::new(CloseBehavior::Ok),
            fail_open: Mutex::new(false),
            panic_open: Mutex::new(false),
            idle: Mutex::new(VecDeque::from([Ok(IdleState::Active)])),
        }
    }
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Open(_)))
            .count()
    }

    pub fn closes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Close(_)))
            .count()
    }

    pub fn icons(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Icon { .. }))
            .collect()
    }

    pub fn badges(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Badge { text, color } => Some((text, color)),
                _ => None,
            })
            .collect()
    }

    pub fn set_close(&self, behavior: CloseBehavior) {
        *self.close.lock().unwrap() = behavior;
    }

    pub fn set_fail_open(&self, fail: bool) {
        *self.fail_open.lock().unwrap() = fail;
    }

    pub fn set_panic_open(&self, panic: bool) {
        *self.panic_open.lock().unwrap() = panic;
    }

    pub fn script_idle(&self, answers: Vec<Result<IdleState, String>>) {
        *self.idle.lock().unwrap() = answers.into();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn open_flash(&self) -> Result<FlashId, AppError> {
        let panic = *self.panic_open.lock().unwrap();
        if panic {
            panic!("flash backend crashed");
        }
        if *self.fail_open.lock().unwrap() {
            return Err(AppError::Flash("no display".into()));
        }
        let id = FlashId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.record(Call::Open(id));
        Ok(id)
    }

    async fn close_flash(&self, id: FlashId) -> Result<(), AppError> {
        self.record(Call::Close(id));
        match *self.close.lock().unwrap() {
            CloseBehavior::Ok => Ok(()),
            CloseBehavior::NotFound => Err(AppError::FlashNotFound(id)),
            CloseBehavior::Fail => Err(AppError::Flash("close failed".into())),
        }
    }

    async fn query_idle(&self, _threshold: Duration) -> Result<IdleState, AppError> {
        let mut idle = self.idle.lock().unwrap();
        let answer = if idle.len() > 1 {
            idle.pop_front()
        } else {
            idle.front().cloned()
        };
        answer
            .unwrap_or(Ok(IdleState::Active))
            .map_err(AppError::Dbus)
    }

    fn set_icon(&self, icon: &FlashMessage) {
        self.record(Call::Icon {
            monitored: icon.monitored,
            advised: icon.metrics.iter().map(|m| m.name.clone()).collect(),
        });
    }

    fn set_badge(&self, text: &str, color: &str) {
        self.record(Call::Badge {
            text: text.to_string(),
            color: color.to_string(),
        });
    }
}

#[derive(Default)]
pub struct Knobs {
    /// `None` makes `metrics` fail.
    pub metrics: Option<Metrics>,
    pub periods: f64,
    pub updates: Vec<ModelEvent>,
    pub fail_update: bool,
}

/// Model whose outputs are set by the test through a shared handle.
pub struct FakeModel {
    state: Option<ModelState>,
    knobs: Arc<Mutex<Knobs>>,
}

impl FakeModel {
    pub fn loaded(metrics: Metrics) -> (Self, Arc<Mutex<Knobs>>) {
        let knobs = Arc::new(Mutex::new(Knobs {
            metrics: Some(metrics),
            periods: f64::INFINITY,
            ..Knobs::default()
        }));
        let model = Self {
            state: Some(ModelState::new(at(0), targets())),
            knobs: knobs.clone(),
        };
        (model, knobs)
    }

    pub fn unloaded() -> (Self, Arc<Mutex<Knobs>>) {
        let (mut model, knobs) = Self::loaded(metrics(0.0, 0.0, 0.0));
        model.state = None;
        (model, knobs)
    }
}

impl Model for FakeModel {
    fn state(&self) -> Option<&ModelState> {
        self.state.as_ref()
    }

    fn metrics(&self, _time: &Time) -> Result<Metrics, AppError> {
        self.knobs
            .lock()
            .unwrap()
            .metrics
            .clone()
            .ok_or_else(|| AppError::Model("metrics unavailable".into()))
    }

    fn periods_since_active(&self, _time: &Time) -> f64 {
        self.knobs.lock().unwrap().periods
    }

    fn update(&mut self, event: ModelEvent) -> Result<(), AppError> {
        let mut knobs = self.knobs.lock().unwrap();
        if knobs.fail_update {
            return Err(AppError::Model("update rejected".into()));
        }
        if let (Some(state), Change::Monitored(m)) = (self.state.as_mut(), &event.change) {
            state.monitored = *m;
        }
        // A fresh activity report restarts the keep-active window.
        if matches!(event.change, Change::IdleState(IdleState::Active)) {
            knobs.periods = 0.0;
        }
        knobs.updates.push(event);
        Ok(())
    }

    fn idle_delay(&self) -> Duration {
        secs(15)
    }
}
