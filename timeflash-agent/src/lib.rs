use std::time::Duration;

use timeflash_shared::api::{self, Change};
use tracing::info;

pub mod app;
pub mod cli;
pub mod config;
pub mod flash;
pub mod idle;
pub mod interpolate;
pub mod model;
pub mod platform;
pub mod ports;
pub mod report;
pub mod store;

pub use cli::{Cli, Command};
pub use config::{AgentConfig, load_config, resolve_config_path};
use platform::FlashId;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dbus error: {0}")]
    Dbus(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("metrics error: {0}")]
    Metrics(#[from] timeflash_shared::MetricsError),
    #[error("flash error: {0}")]
    Flash(String),
    #[error("no flash window with id {0}")]
    FlashNotFound(FlashId),
    #[error("store error: {0}")]
    Store(String),
    #[error("http error: {0}")]
    Http(String),
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    init_tracing();

    let (cfg_path, cfg) = AgentConfig::find_and_load(cli.config)?;
    info!(path=?cfg_path, "loaded config");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Flash { seconds } => {
                let close_after = Duration::try_from_secs_f64(seconds)
                    .map_err(|e| AppError::Config(format!("invalid --seconds: {e}")))?;
                app::tester::run_flash(&cfg, close_after).await
            }
            Command::Status => app::tester::print_status(&cfg).await,
            Command::Pause => send_change(&cfg, Change::Monitored(false)).await,
            Command::Resume => send_change(&cfg, Change::Monitored(true)).await,
        };
    }

    app::agent::run(cfg).await
}

async fn send_change(cfg: &AgentConfig, change: Change) -> Result<(), AppError> {
    let base = cfg.base_url();
    api::rest::post_change(&base, api::PORT_DETAILS, &change)
        .await
        .map_err(|e| AppError::Http(format!("{base}: {e}")))?;
    info!(?change, "change delivered to running agent");
    Ok(())
}
