#[cfg(target_os = "linux")]
pub mod linux;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use timeflash_shared::IdleState;
use timeflash_shared::api::FlashMessage;

use crate::{AppError, config::AgentConfig};

/// Handle of an open flash surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FlashId(pub u32);

impl fmt::Display for FlashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cross-platform interface for OS-level actions we need.
#[async_trait]
pub trait Platform: Send + Sync {
    /// One-time process setup before anything else touches the OS.
    fn initialize_process(&self) {}
    async fn open_flash(&self) -> Result<FlashId, AppError>;
    /// Fails with [`AppError::FlashNotFound`] when the surface is already gone.
    async fn close_flash(&self, id: FlashId) -> Result<(), AppError>;
    async fn query_idle(&self, threshold: Duration) -> Result<IdleState, AppError>;
    fn set_icon(&self, icon: &FlashMessage);
    fn set_badge(&self, text: &str, color: &str);
}

/// Detect the current platform and return an implementation.
#[cfg(target_os = "linux")]
pub async fn detect(cfg: &AgentConfig) -> Result<Arc<dyn Platform>, AppError> {
    let backend = linux::flash::detect_flash_backend(cfg);
    Ok(Arc::new(linux::LinuxPlatform::new(backend)))
}

#[cfg(not(target_os = "linux"))]
pub async fn detect(_cfg: &AgentConfig) -> Result<Arc<dyn Platform>, AppError> {
    Err(AppError::Config(
        "no platform implementation for this OS".into(),
    ))
}
