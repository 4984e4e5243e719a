pub mod flash;
pub mod idle;

use std::path::{Path, PathBuf};
use std::time::Duration;

use timeflash_shared::IdleState;
use timeflash_shared::api::FlashMessage;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{FlashId, Platform};
use crate::AppError;

/// Linux implementation of the cross-platform interface.
pub struct LinuxPlatform {
    flasher: Mutex<flash::Flasher>,
    idle: idle::IdleProbe,
}

impl LinuxPlatform {
    pub fn new(flash_backend: flash::FlashBackend) -> Self {
        Self {
            flasher: Mutex::new(flash::Flasher::new(flash_backend)),
            idle: idle::IdleProbe::default(),
        }
    }
}

/// Points the process at the user's session bus when started outside a
/// graphical session (e.g. from a systemd user unit).
pub fn ensure_console_dbus_env() {
    if std::env::var_os("DBUS_SESSION_BUS_ADDRESS").is_some() {
        return;
    }

    let Some(runtime_dir) = find_runtime_dir_with_bus() else {
        return;
    };

    if std::env::var_os("XDG_RUNTIME_DIR").is_none() {
        // SAFETY: runs during startup, before any task that touches the
        // environment is spawned. Runtime workers exist but only idle.
        unsafe {
            std::env::set_var("XDG_RUNTIME_DIR", runtime_dir.as_os_str());
        }
    }
    let addr = bus_address(&runtime_dir);
    // SAFETY: as above.
    unsafe {
        std::env::set_var("DBUS_SESSION_BUS_ADDRESS", addr);
    }
}

fn find_runtime_dir_with_bus() -> Option<PathBuf> {
    let from_env = std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from);
    let uid = nix::unistd::geteuid().as_raw();
    from_env
        .into_iter()
        .chain(std::iter::once(PathBuf::from(format!("/run/user/{uid}"))))
        .find(|dir| dir.join("bus").exists())
}

fn bus_address(runtime: &Path) -> String {
    format!("unix:path={}", runtime.join("bus").display())
}

#[async_trait::async_trait]
impl Platform for LinuxPlatform {
    fn initialize_process(&self) {
        ensure_console_dbus_env();
    }

    async fn open_flash(&self) -> Result<FlashId, AppError> {
        self.flasher.lock().await.open().await
    }

    async fn close_flash(&self, id: FlashId) -> Result<(), AppError> {
        self.flasher.lock().await.close(id).await
    }

    async fn query_idle(&self, threshold: Duration) -> Result<IdleState, AppError> {
        self.idle.query(threshold).await
    }

    fn set_icon(&self, icon: &FlashMessage) {
        // Drawing is left to the UI listening on the flash port.
        debug!(
            monitored = icon.monitored,
            advised = icon.metrics.len(),
            "icon state"
        );
    }

    fn set_badge(&self, text: &str, color: &str) {
        // Shown by the UI via the badge port and the icon snapshot.
        warn!(badge = text, color = color, "badge updated");
    }
}
