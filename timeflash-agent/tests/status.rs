mod common;

use common::{at, targets};
use timeflash_agent::AgentConfig;
use timeflash_agent::app::tester::status_snapshot;
use timeflash_agent::model::ModelState;

#[test]
fn status_reports_metrics_of_stored_state() {
    let mut state = ModelState::new(at(0), targets());
    state.monitored = false;
    state.daily_values.insert("1970-01-01".into(), 14_400.0);

    let details = status_snapshot(&AgentConfig::default(), state, &at(60)).unwrap();
    assert!(!details.monitored);
    assert!(details.first_week);
    let daily = details.metrics.get("daily").unwrap();
    assert!((daily.ratio - 0.5).abs() < 1e-9);
    assert!(daily.advised);
    assert_eq!(details.metrics.get("session").unwrap().ratio, 0.0);
}
