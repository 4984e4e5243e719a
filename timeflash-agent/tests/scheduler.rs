mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Call, FakeModel, FakePlatform, Knobs, at, metrics};
use serde_json::Value;
use timeflash_agent::app::scheduler::{Scheduler, TICK_INTERVAL, TickOutcome};
use timeflash_agent::flash::FlashController;
use timeflash_agent::ports::PortHub;
use timeflash_agent::AppError;
use timeflash_agent::report::ErrorReporter;
use timeflash_shared::api::Change;
use timeflash_shared::{IdleState, Metrics};
use tokio::time::Instant;

struct Harness {
    scheduler: Scheduler,
    platform: Arc<FakePlatform>,
    knobs: Arc<Mutex<Knobs>>,
    hub: PortHub,
    errors: ErrorReporter,
    clock: Arc<Mutex<u64>>,
}

impl Harness {
    fn new(model: (FakeModel, Arc<Mutex<Knobs>>)) -> Self {
        let (model, knobs) = model;
        let platform = FakePlatform::new();
        let hub = PortHub::default();
        let errors = ErrorReporter::new(platform.clone());
        let flash = FlashController::new(platform.clone(), errors.clone());
        let clock = Arc::new(Mutex::new(10_000));
        let now = clock.clone();
        let scheduler = Scheduler::new(Box::new(model), platform.clone(), flash, hub.clone())
            .with_clock(move || at(*now.lock().unwrap()));
        Self {
            scheduler,
            platform,
            knobs,
            hub,
            errors,
            clock,
        }
    }

    fn loaded(m: Metrics) -> Self {
        Self::new(FakeModel::loaded(m))
    }

    fn advance(&self, s: u64) {
        *self.clock.lock().unwrap() += s;
    }

    fn set_periods(&self, periods: f64) {
        self.knobs.lock().unwrap().periods = periods;
    }

    fn updates(&self) -> usize {
        self.knobs.lock().unwrap().updates.len()
    }
}

/// Lets detached flash tasks run to completion under paused time.
async fn settle() {
    tokio::time::sleep(Duration::from_secs(30)).await;
}

#[tokio::test(start_paused = true)]
async fn skips_until_state_is_loaded() {
    let mut h = Harness::new(FakeModel::unloaded());
    assert_eq!(h.scheduler.tick().unwrap(), TickOutcome::NotLoaded);
    assert!(h.platform.calls().is_empty());
    assert_eq!(h.scheduler.rearm_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn tick_updates_icon_and_rearms() {
    let mut h = Harness::loaded(metrics(0.6, 0.1, 0.0));
    let before = Instant::now();
    assert_eq!(
        h.scheduler.tick().unwrap(),
        TickOutcome::Ran { rearmed: true }
    );
    assert_eq!(
        h.platform.icons(),
        vec![Call::Icon {
            monitored: true,
            advised: vec!["session".to_string()],
        }]
    );
    assert_eq!(h.scheduler.rearm_deadline(), Some(before + TICK_INTERVAL));
    assert!(!h.scheduler.take_dirty());
}

#[tokio::test(start_paused = true)]
async fn rest_attained_stops_rearming() {
    let mut h = Harness::loaded(metrics(0.0, 0.1, 1.0));
    assert_eq!(
        h.scheduler.tick().unwrap(),
        TickOutcome::Ran { rearmed: false }
    );
    assert_eq!(h.scheduler.rearm_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_nudge_window() {
    for (periods, nudged) in [(0.85, true), (0.8, true), (0.79, false), (1.0, false)] {
        let mut h = Harness::loaded(metrics(0.1, 0.1, 0.0));
        h.set_periods(periods);
        h.scheduler.tick().unwrap();
        assert_eq!(h.updates() == 1, nudged, "periods {periods}");
        assert_eq!(h.scheduler.take_dirty(), nudged);
    }
}

#[tokio::test(start_paused = true)]
async fn nudge_inside_tick_does_not_tick_again() {
    let mut h = Harness::loaded(metrics(0.1, 0.1, 0.0));
    h.set_periods(0.9);
    let mut flash_port = h.hub.connect("flash");

    h.scheduler.tick().unwrap();

    let knobs = h.knobs.lock().unwrap();
    assert_eq!(knobs.updates.len(), 1);
    assert_eq!(knobs.updates[0].time, at(10_000));
    assert_eq!(
        knobs.updates[0].change,
        Change::IdleState(IdleState::Active)
    );
    drop(knobs);
    assert_eq!(h.platform.icons().len(), 1);
    assert!(flash_port.rx.try_recv().is_ok());
    assert!(flash_port.rx.try_recv().is_err());
    assert!(h.scheduler.rearm_deadline().is_some());
}

#[tokio::test(start_paused = true)]
async fn apply_stamps_time_and_ticks() {
    let mut h = Harness::loaded(metrics(0.1, 0.1, 0.0));
    h.advance(5);
    h.scheduler.apply(Change::Monitored(false)).unwrap();

    let knobs = h.knobs.lock().unwrap();
    assert_eq!(knobs.updates.len(), 1);
    assert_eq!(knobs.updates[0].time, at(10_005));
    drop(knobs);
    assert!(h.scheduler.take_dirty());
    assert!(!h.scheduler.take_dirty());
    assert_eq!(
        h.platform.icons(),
        vec![Call::Icon {
            monitored: false,
            advised: vec![],
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_update_is_not_dirty() {
    let mut h = Harness::loaded(metrics(0.1, 0.1, 0.0));
    h.knobs.lock().unwrap().fail_update = true;
    assert!(h.scheduler.apply(Change::Monitored(false)).is_err());
    assert!(!h.scheduler.take_dirty());
    assert!(h.platform.icons().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failing_tick_releases_guard_without_rearming() {
    let mut h = Harness::loaded(metrics(0.1, 0.1, 0.0));
    h.scheduler.tick().unwrap();
    assert!(h.scheduler.rearm_deadline().is_some());

    let good = h.knobs.lock().unwrap().metrics.take();
    assert!(h.scheduler.tick().is_err());
    assert_eq!(h.scheduler.rearm_deadline(), None);

    h.knobs.lock().unwrap().metrics = good;
    assert_eq!(
        h.scheduler.tick().unwrap(),
        TickOutcome::Ran { rearmed: true }
    );
}

#[tokio::test(start_paused = true)]
async fn attained_budget_flashes_once_per_interval() {
    let mut h = Harness::loaded(metrics(1.2, 0.1, 0.0));
    h.scheduler.tick().unwrap();
    h.scheduler.tick().unwrap();
    settle().await;
    assert_eq!(h.platform.opens(), 1);
    assert_eq!(h.platform.closes(), 1);

    h.advance(20);
    h.scheduler.tick().unwrap();
    settle().await;
    assert_eq!(h.platform.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn unmonitored_flashes_after_session_and_rest() {
    let mut h = Harness::loaded(metrics(0.1, 0.1, 0.0));
    h.scheduler.apply(Change::Monitored(false)).unwrap();
    settle().await;
    assert_eq!(h.platform.opens(), 0);
    assert_eq!(
        h.scheduler.policy().last_flash_unmonitored(),
        Some(at(10_000 - 300))
    );

    h.advance(1499);
    h.scheduler.tick().unwrap();
    settle().await;
    assert_eq!(h.platform.opens(), 0);

    h.advance(1);
    h.scheduler.tick().unwrap();
    settle().await;
    assert_eq!(h.platform.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn broadcasts_to_connected_ports() {
    let mut h = Harness::loaded(metrics(0.6, 0.1, 0.0));
    let mut flash = h.hub.connect("flash");
    let mut details = h.hub.connect("details");

    h.scheduler.tick().unwrap();

    let msg: Value = serde_json::from_str(&flash.rx.try_recv().unwrap()).unwrap();
    assert_eq!(msg["monitored"], true);
    assert_eq!(msg["metrics"].as_array().unwrap().len(), 1);
    assert_eq!(msg["metrics"][0]["name"], "session");

    let msg: Value = serde_json::from_str(&details.rx.try_recv().unwrap()).unwrap();
    assert_eq!(msg["firstWeek"], true);
    assert!(msg["dailyValues"].is_object());
    let keys: Vec<&String> = msg["metrics"].as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 3);
    assert!(msg["metrics"]["rest"].is_object());
}

#[tokio::test(start_paused = true)]
async fn icon_snapshot_carries_error_badge() {
    let mut h = Harness::loaded(metrics(0.1, 0.1, 0.0));
    let mut flash = h.hub.connect("flash");

    h.scheduler.tick().unwrap();
    let msg: Value = serde_json::from_str(&flash.rx.try_recv().unwrap()).unwrap();
    assert!(msg.get("badge").is_none());

    h.errors.report(&AppError::Store("disk full".into()));
    h.scheduler.tick().unwrap();
    let msg: Value = serde_json::from_str(&flash.rx.try_recv().unwrap()).unwrap();
    assert_eq!(msg["badge"]["text"], "1");
    assert_eq!(msg["badge"]["color"], "red");
}
