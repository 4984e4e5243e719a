mod common;

use std::time::Duration;

use common::{at, targets};
use timeflash_agent::AppError;
use timeflash_agent::model::ModelState;
use timeflash_agent::store::{StateStore, StoreStats};

#[tokio::test]
async fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn save_then_load_returns_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    let mut store = StateStore::new(path.clone());

    let mut state = ModelState::new(at(100), targets());
    state.monitored = false;
    state.daily_values.insert("1970-01-01".into(), 42.5);
    store.save(&state).await.unwrap();
    store.save(&state).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["state"]["monitored"], false);
    assert_eq!(raw["state"]["dailyValues"]["1970-01-01"], 42.5);

    let reopened = StateStore::new(path);
    assert_eq!(reopened.load().await.unwrap(), Some(state));
    assert_eq!(store.stats().count, 2);
    assert!(store.stats().max >= store.stats().mean);
}

#[tokio::test]
async fn corrupt_file_is_a_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{not json").unwrap();
    let err = StateStore::new(path).load().await.unwrap_err();
    assert!(matches!(err, AppError::Store(_)), "{err}");
}

#[test]
fn stats_keep_running_mean_and_max() {
    let mut stats = StoreStats::default();
    for ms in [10, 20, 30, 40] {
        stats.record(Duration::from_millis(ms));
    }
    assert_eq!(stats.count, 4);
    assert_eq!(stats.max, Duration::from_millis(40));
    let mean_ms = stats.mean.as_secs_f64() * 1000.0;
    assert!((mean_ms - 25.0).abs() < 1e-3, "{mean_ms}");
}
