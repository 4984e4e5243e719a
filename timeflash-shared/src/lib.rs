pub mod api;
pub mod domain;

pub use domain::{IdleState, Metric, Metrics, MetricsError, Time};
