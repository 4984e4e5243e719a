use std::collections::HashMap;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::platform::FlashId;
use crate::{AppError, config::AgentConfig};

#[derive(Clone, Debug)]
pub enum FlashBackend {
    Notification,
    CommandOverride(Vec<String>),
}

pub fn detect_flash_backend(cfg: &AgentConfig) -> FlashBackend {
    if let Some(custom) = &cfg.flash_cmd {
        info!("using flash_cmd override");
        return FlashBackend::CommandOverride(custom.clone());
    }
    FlashBackend::Notification
}

enum Surface {
    Notification(notify_rust::NotificationHandle),
    Process(Child),
}

/// Tracks open flash surfaces by id.
pub struct Flasher {
    backend: FlashBackend,
    next_id: u32,
    open: HashMap<FlashId, Surface>,
}

impl Flasher {
    pub fn new(backend: FlashBackend) -> Self {
        debug!(?backend, "Linux flasher created");
        Self {
            backend,
            next_id: 0,
            open: HashMap::new(),
        }
    }

    pub async fn open(&mut self) -> Result<FlashId, AppError> {
        let surface = match &self.backend {
            FlashBackend::Notification => Surface::Notification(show_notification().await?),
            FlashBackend::CommandOverride(cmd) => Surface::Process(spawn_command(cmd)?),
        };
        self.next_id = self.next_id.wrapping_add(1);
        let id = FlashId(self.next_id);
        self.open.insert(id, surface);
        debug!(%id, "flash opened");
        Ok(id)
    }

    pub async fn close(&mut self, id: FlashId) -> Result<(), AppError> {
        let Some(surface) = self.open.remove(&id) else {
            return Err(AppError::FlashNotFound(id));
        };
        match surface {
            Surface::Notification(handle) => {
                // Closing a notification the user already dismissed is a no-op
                // on the server side.
                run_blocking(move || handle.close()).await
            }
            Surface::Process(mut child) => {
                if child.try_wait()?.is_some() {
                    return Err(AppError::FlashNotFound(id));
                }
                child.kill().await?;
                Ok(())
            }
        }
    }
}

/// Runs `f` on the blocking pool. notify-rust's synchronous close drives its
/// own runtime and must not be called from a task on ours.
pub async fn run_blocking<F>(f: F) -> Result<(), AppError>
where
    F: FnOnce() + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Flash(format!("close failed: {e}")))
}

async fn show_notification() -> Result<notify_rust::NotificationHandle, AppError> {
    let mut n = notify_rust::Notification::new();
    n.appname("timeflash")
        .summary("Time for a break")
        .body("You have used up your time budget.")
        .urgency(notify_rust::Urgency::Critical)
        .timeout(notify_rust::Timeout::Never)
        .show_async()
        .await
        .map_err(|e| AppError::Flash(e.to_string()))
}

fn spawn_command(cmd: &[String]) -> Result<Child, AppError> {
    let (program, args) = cmd
        .split_first()
        .ok_or_else(|| AppError::Config("flash_cmd empty".into()))?;
    debug!(program=%program, args=?args, "starting flash command (override)");
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;
    Ok(child)
}
