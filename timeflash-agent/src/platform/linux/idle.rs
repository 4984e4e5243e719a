use std::time::Duration;

use timeflash_shared::IdleState;
use tokio::sync::OnceCell;
use zbus::proxy::Proxy;

use crate::AppError;

fn dbus(e: zbus::Error) -> AppError {
    AppError::Dbus(e.to_string())
}

/// Reads idle time from GNOME's Mutter IdleMonitor and the lock hint from
/// logind. Bus connections are opened on first use and reused.
#[derive(Default)]
pub struct IdleProbe {
    session: OnceCell<zbus::Connection>,
    system: OnceCell<zbus::Connection>,
}

impl IdleProbe {
    async fn session_bus(&self) -> Result<&zbus::Connection, AppError> {
        self.session
            .get_or_try_init(|| async { zbus::Connection::session().await.map_err(dbus) })
            .await
    }

    async fn system_bus(&self) -> Result<&zbus::Connection, AppError> {
        self.system
            .get_or_try_init(|| async { zbus::Connection::system().await.map_err(dbus) })
            .await
    }

    pub async fn idle_time(&self) -> Result<Duration, AppError> {
        let conn = self.session_bus().await?;
        let proxy = Proxy::new(
            conn,
            "org.gnome.Mutter.IdleMonitor",
            "/org/gnome/Mutter/IdleMonitor/Core",
            "org.gnome.Mutter.IdleMonitor",
        )
        .await
        .map_err(dbus)?;
        let reply = proxy.call_method("GetIdletime", &()).await.map_err(dbus)?;
        let millis: u64 = reply.body().deserialize().map_err(dbus)?;
        Ok(Duration::from_millis(millis))
    }

    pub async fn is_session_locked(&self) -> Result<bool, AppError> {
        let conn = self.system_bus().await?;
        let proxy = Proxy::new(
            conn,
            "org.freedesktop.login1",
            "/org/freedesktop/login1/session/auto",
            "org.freedesktop.login1.Session",
        )
        .await
        .map_err(dbus)?;
        proxy.get_property::<bool>("LockedHint").await.map_err(dbus)
    }

    pub async fn query(&self, threshold: Duration) -> Result<IdleState, AppError> {
        if self.is_session_locked().await? {
            return Ok(IdleState::Locked);
        }
        let idle = self.idle_time().await?;
        Ok(if idle >= threshold {
            IdleState::Idle
        } else {
            IdleState::Active
        })
    }
}
