use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use time::{OffsetDateTime, UtcOffset};

/// Name of the reserved recovery metric present in every snapshot.
pub const REST: &str = "rest";
/// Name of the metric tracking the current working session.
pub const SESSION: &str = "session";

/// Active seconds per local calendar day, keyed by `YYYY-MM-DD`.
pub type DailyValues = BTreeMap<String, f64>;

/// A wall-clock instant rounded to deciseconds, carrying the local UTC offset
/// captured when it was sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Time {
    /// Samples the system clock. The local offset is resolved once here and
    /// baked into the value.
    pub fn now() -> Self {
        let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Self::from_unix_millis(millis, offset)
    }

    /// Builds a time from milliseconds since the epoch, rounded to the nearest
    /// 100 ms.
    pub fn from_unix_millis(millis: i128, offset: UtcOffset) -> Self {
        let rounded = (millis + 50).div_euclid(100) * 100;
        let at = OffsetDateTime::from_unix_timestamp_nanos(rounded * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Time(at.to_offset(offset))
    }

    pub fn unix_millis(&self) -> i128 {
        self.0.unix_timestamp_nanos() / 1_000_000
    }

    pub fn offset(&self) -> UtcOffset {
        self.0.offset()
    }

    /// Local calendar day as `YYYY-MM-DD`.
    pub fn day_key(&self) -> String {
        self.0.date().to_string()
    }

    pub fn minus(&self, d: Duration) -> Self {
        let at = time::Duration::try_from(d)
            .ok()
            .and_then(|d| self.0.checked_sub(d))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH.to_offset(self.0.offset()));
        Time(at)
    }

    pub fn plus(&self, d: Duration) -> Self {
        let at = time::Duration::try_from(d)
            .ok()
            .and_then(|d| self.0.checked_add(d))
            .unwrap_or(self.0);
        Time(at)
    }

    /// Time elapsed since `earlier`, saturating at zero when `earlier` lies in
    /// the future.
    pub fn since(&self, earlier: &Time) -> Duration {
        Duration::try_from(self.0 - earlier.0).unwrap_or(Duration::ZERO)
    }

    /// Like [`Time::since`], where `None` stands for the infinitely distant
    /// past.
    pub fn elapsed_since(&self, earlier: Option<&Time>) -> Duration {
        earlier.map_or(Duration::MAX, |e| self.since(e))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

impl fmt::Display for IdleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdleState::Active => "active",
            IdleState::Idle => "idle",
            IdleState::Locked => "locked",
        };
        f.write_str(s)
    }
}

/// Serializes a [`Duration`] as fractional seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// A named time-budget counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(with = "duration_secs")]
    pub target: Duration,
    pub ratio: f64,
    pub attained: bool,
    pub advised: bool,
}

impl Metric {
    pub fn new(name: impl Into<String>, target: Duration, ratio: f64, advised: bool) -> Self {
        Self {
            name: name.into(),
            target,
            ratio,
            attained: ratio >= 1.0,
            advised,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.name == REST
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MetricsError {
    #[error("snapshot has no `rest` metric")]
    MissingRest,
    #[error("duplicate metric `{0}`")]
    Duplicate(String),
    #[error("metric `{0}` has an invalid ratio")]
    InvalidRatio(String),
}

/// A snapshot of metrics in insertion order, always containing exactly one
/// `rest` metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    entries: Vec<Metric>,
    rest_idx: usize,
}

impl Metrics {
    pub fn new(entries: Vec<Metric>) -> Result<Self, MetricsError> {
        let mut seen = HashSet::new();
        for m in &entries {
            if !seen.insert(m.name.as_str()) {
                return Err(MetricsError::Duplicate(m.name.clone()));
            }
            if !m.ratio.is_finite() || m.ratio < 0.0 {
                return Err(MetricsError::InvalidRatio(m.name.clone()));
            }
        }
        let rest_idx = entries
            .iter()
            .position(Metric::is_rest)
            .ok_or(MetricsError::MissingRest)?;
        Ok(Self { entries, rest_idx })
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.entries.iter().find(|m| m.name == name)
    }

    pub fn rest(&self) -> &Metric {
        &self.entries[self.rest_idx]
    }

    /// Every metric except `rest`, in snapshot order.
    pub fn exhaustible(&self) -> impl Iterator<Item = &Metric> {
        self.entries.iter().filter(|m| !m.is_rest())
    }

    pub fn advised(&self) -> Vec<Metric> {
        self.entries.iter().filter(|m| m.advised).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Metrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for m in &self.entries {
            map.serialize_entry(&m.name, m)?;
        }
        map.end()
    }
}
