use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use timeflash_shared::api::{Badge, PORT_BADGE};
use tracing::{error, warn};

use crate::AppError;
use crate::platform::Platform;
use crate::ports::PortHub;

pub const BADGE_ERROR_COLOR: &str = "red";

/// Process-wide sink for failures nobody else handles. Each report bumps
/// the counter shown on the badge.
#[derive(Clone)]
pub struct ErrorReporter {
    count: Arc<AtomicU64>,
    platform: Arc<dyn Platform>,
    ports: Option<PortHub>,
}

impl ErrorReporter {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            count: Arc::new(AtomicU64::new(0)),
            platform,
            ports: None,
        }
    }

    /// Also pushes the badge to the `badge` port on every report.
    pub fn with_ports(mut self, ports: PortHub) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn report(&self, err: &AppError) -> u64 {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        error!(error=%err, count, "unhandled error");
        let badge = badge_for(count);
        self.platform.set_badge(&badge.text, &badge.color);
        if let Some(ports) = &self.ports
            && let Err(e) = ports.send(PORT_BADGE, &badge)
        {
            warn!(error=%e, "badge broadcast failed");
        }
        count
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Current badge, `None` until the first error.
    pub fn badge(&self) -> Option<Badge> {
        match self.count() {
            0 => None,
            n => Some(badge_for(n)),
        }
    }
}

fn badge_for(count: u64) -> Badge {
    Badge {
        text: count.to_string(),
        color: BADGE_ERROR_COLOR.to_string(),
    }
}
