//! Transient full-screen flash: open, wait, close.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::AppError;
use crate::platform::Platform;
use crate::report::ErrorReporter;

/// Close delay used when a policy does not pick one.
pub const DEFAULT_CLOSE_AFTER: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct FlashController {
    platform: Arc<dyn Platform>,
    errors: ErrorReporter,
}

impl FlashController {
    pub fn new(platform: Arc<dyn Platform>, errors: ErrorReporter) -> Self {
        Self { platform, errors }
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.errors
    }

    /// Runs a flash in the background. The caller never waits for it; the
    /// handle is only useful to tests. Errors and panics of the flash both
    /// end up at the error reporter.
    pub fn trigger(&self, close_after: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let inner = this.clone();
            let outcome = tokio::spawn(async move { inner.flash(close_after).await })
                .await
                .unwrap_or_else(|e| Err(AppError::Flash(format!("flash task failed: {e}"))));
            if let Err(e) = outcome {
                this.errors.report(&e);
            }
        })
    }

    pub async fn flash(&self, close_after: Duration) -> Result<(), AppError> {
        let id = self.platform.open_flash().await?;
        debug!(%id, ?close_after, "flash shown");
        tokio::time::sleep(close_after).await;
        match self.platform.close_flash(id).await {
            Err(AppError::FlashNotFound(id)) => {
                debug!(%id, "flash already dismissed");
                Ok(())
            }
            other => other,
        }
    }
}
