//! Durable storage for the model state.
//!
//! The whole state is written after every mutation as a single JSON document
//! `{"state": ...}`. Writes go to a temporary file first and are renamed into
//! place, so a crash never leaves a half-written file behind.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AppError;
use crate::model::ModelState;

/// Latency summary is logged once per this many writes.
pub const STORE_LOG_EVERY: u64 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreStats {
    pub count: u64,
    pub mean: Duration,
    pub max: Duration,
}

impl StoreStats {
    pub fn record(&mut self, latency: Duration) {
        self.count += 1;
        let mean = self.mean.as_secs_f64();
        let delta = (latency.as_secs_f64() - mean) / self.count as f64;
        self.mean = Duration::from_secs_f64((mean + delta).max(0.0));
        self.max = self.max.max(latency);
    }
}

#[derive(Serialize)]
struct StoredRef<'a> {
    state: &'a ModelState,
}

#[derive(Deserialize)]
struct Stored {
    state: ModelState,
}

pub struct StateStore {
    path: PathBuf,
    stats: StoreStats,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            stats: StoreStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when nothing has been stored yet.
    pub async fn load(&self) -> Result<Option<ModelState>, AppError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: Stored = serde_json::from_slice(&data).map_err(|e| {
            AppError::Store(format!("parse {} failed: {e}", self.path.display()))
        })?;
        debug!(path=?self.path, "state loaded");
        Ok(Some(stored.state))
    }

    pub async fn save(&mut self, state: &ModelState) -> Result<(), AppError> {
        let started = Instant::now();
        let body = serde_json::to_vec(&StoredRef { state })?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        self.stats.record(started.elapsed());
        if self.stats.count % STORE_LOG_EVERY == 0 {
            info!(
                writes = self.stats.count,
                mean_ms = self.stats.mean.as_secs_f64() * 1000.0,
                max_ms = self.stats.max.as_secs_f64() * 1000.0,
                "state store latency"
            );
        }
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }
}
