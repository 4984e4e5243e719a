//! When to interrupt the user.
//!
//! Two independent rules, each remembering when it last fired:
//! - unmonitored: monitoring has been off for a full session plus rest;
//! - attained: an exhaustible budget has been used up while the user is not
//!   resting. The more it is overrun, the sooner and longer the flash.

use std::time::Duration;

use timeflash_shared::domain::SESSION;
use timeflash_shared::{Metric, Metrics, Time};

use crate::AppError;
use crate::flash::DEFAULT_CLOSE_AFTER;
use crate::interpolate::interpolate_duration;

/// Exhaustion at which the attained schedule reaches its far bound.
pub const EXHAUSTION_LIMIT: f64 = 16.0 / 15.0;
/// Added to the idle delay to get the shortest attained interval.
pub const MIN_OPEN_MARGIN: Duration = Duration::from_secs(5);
pub const MAX_CLOSE_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct NotificationPolicy {
    idle_delay: Duration,
    was_monitored: bool,
    last_flash_unmonitored: Option<Time>,
    last_flash_attained: Option<Time>,
}

impl NotificationPolicy {
    pub fn new(idle_delay: Duration) -> Self {
        Self {
            idle_delay,
            was_monitored: true,
            last_flash_unmonitored: None,
            last_flash_attained: None,
        }
    }

    pub fn was_monitored(&self) -> bool {
        self.was_monitored
    }

    pub fn last_flash_unmonitored(&self) -> Option<Time> {
        self.last_flash_unmonitored
    }

    pub fn last_flash_attained(&self) -> Option<Time> {
        self.last_flash_attained
    }

    /// Returns the close delay when a flash is due because monitoring has
    /// been off for too long.
    pub fn maybe_flash_unmonitored(
        &mut self,
        time: &Time,
        monitored: bool,
        metrics: &Metrics,
    ) -> Result<Option<Duration>, AppError> {
        let session = metrics
            .get(SESSION)
            .ok_or_else(|| AppError::Model("metrics lack a session entry".into()))?;
        if monitored {
            self.was_monitored = true;
            return Ok(None);
        }
        let rest = metrics.rest();
        if self.was_monitored {
            // Pretend a flash just happened one rest period ago, so the first
            // one comes a full session after monitoring stopped.
            self.last_flash_unmonitored = Some(time.minus(rest.target));
        }
        let open_after = session.target + rest.target;
        let mut decision = None;
        if time.elapsed_since(self.last_flash_unmonitored.as_ref()) >= open_after {
            self.last_flash_unmonitored = Some(*time);
            decision = Some(DEFAULT_CLOSE_AFTER);
        }
        self.was_monitored = monitored;
        Ok(decision)
    }

    /// Returns the close delay when a flash is due because a budget has been
    /// used up.
    pub fn maybe_flash_attained(
        &mut self,
        time: &Time,
        monitored: bool,
        metrics: &Metrics,
    ) -> Option<Duration> {
        if !monitored || metrics.rest().ratio != 0.0 {
            return None;
        }
        let worst = most_exhausted(metrics).filter(|m| m.attained)?;
        let (open_after, close_after) = attained_schedule(self.idle_delay, worst);
        if time.elapsed_since(self.last_flash_attained.as_ref()) < open_after {
            return None;
        }
        self.last_flash_attained = Some(*time);
        Some(close_after)
    }
}

/// Exhaustible metric with the highest ratio; the earliest one wins ties.
fn most_exhausted(metrics: &Metrics) -> Option<&Metric> {
    metrics.exhaustible().fold(None, |best, m| match best {
        Some(b) if m.ratio <= b.ratio => Some(b),
        _ => Some(m),
    })
}

/// `(open_after, close_after)` for an attained metric.
pub fn attained_schedule(idle_delay: Duration, metric: &Metric) -> (Duration, Duration) {
    let exhaustion = metric.ratio.clamp(1.0, EXHAUSTION_LIMIT);
    let min_open_after = idle_delay + MIN_OPEN_MARGIN;
    let slowest = (metric.target / 60).max(min_open_after);
    let open_after = interpolate_duration(slowest, min_open_after, EXHAUSTION_LIMIT, exhaustion)
        .max(min_open_after);
    let close_after =
        interpolate_duration(DEFAULT_CLOSE_AFTER, MAX_CLOSE_AFTER, EXHAUSTION_LIMIT, exhaustion)
            .min(MAX_CLOSE_AFTER);
    (open_after, close_after)
}
