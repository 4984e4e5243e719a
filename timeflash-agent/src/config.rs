use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppError;
use crate::model::Targets;

pub const ENV_CONFIG: &str = "TIMEFLASH_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// OS idle detection threshold.
    #[serde(default = "default_idle_delay")]
    pub idle_delay_secs: u64,
    /// How long a single activity report keeps the user counted as active.
    #[serde(default = "default_keep_active_period")]
    pub keep_active_period_secs: u64,
    /// Address of the local port server used by UI surfaces.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Where model state is persisted. Defaults to the XDG data dir.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Optional override for the flash overlay. The process is started on
    /// open and killed on close. Example: ["feh", "--fullscreen", "/path/break.png"]
    #[serde(default)]
    pub flash_cmd: Option<Vec<String>>,
    /// Targets used when no persisted state exists yet.
    #[serde(default)]
    pub targets: TargetsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default = "default_session")]
    pub session_secs: u64,
    #[serde(default = "default_rest")]
    pub rest_secs: u64,
    #[serde(default = "default_daily")]
    pub daily_secs: u64,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            session_secs: default_session(),
            rest_secs: default_rest(),
            daily_secs: default_daily(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            idle_delay_secs: default_idle_delay(),
            keep_active_period_secs: default_keep_active_period(),
            listen_addr: default_listen_addr(),
            state_path: None,
            flash_cmd: None,
            targets: TargetsConfig::default(),
        }
    }
}

fn default_idle_delay() -> u64 {
    15
}

fn default_keep_active_period() -> u64 {
    25
}

fn default_listen_addr() -> String {
    "127.0.0.1:5157".to_string()
}

fn default_session() -> u64 {
    25 * 60
}

fn default_rest() -> u64 {
    5 * 60
}

fn default_daily() -> u64 {
    8 * 60 * 60
}

impl AgentConfig {
    /// Resolves the config path and loads it. A missing file is only
    /// tolerated at the default location, where it yields defaults.
    pub fn find_and_load(cli_value: Option<PathBuf>) -> Result<(PathBuf, AgentConfig), AppError> {
        let explicit = cli_value.is_some() || std::env::var_os(ENV_CONFIG).is_some();
        let path = resolve_config_path(cli_value)?;
        if !explicit && !path.exists() {
            info!(path=?path, "no config file; using defaults");
            return Ok((path, AgentConfig::default()));
        }
        let cfg = load_config(&path)?;
        Ok((path, cfg))
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_secs(self.idle_delay_secs)
    }

    pub fn keep_active_period(&self) -> Duration {
        Duration::from_secs(self.keep_active_period_secs)
    }

    pub fn initial_targets(&self) -> Targets {
        Targets {
            session: Duration::from_secs(self.targets.session_secs),
            rest: Duration::from_secs(self.targets.rest_secs),
            daily: Duration::from_secs(self.targets.daily_secs),
        }
    }

    pub fn state_path(&self) -> Result<PathBuf, AppError> {
        if let Some(p) = &self.state_path {
            return Ok(p.clone());
        }
        default_state_path()
            .ok_or_else(|| AppError::Config("could not determine data dir".into()))
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.listen_addr)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.keep_active_period_secs == 0 {
            return Err(AppError::Config(
                "keep_active_period_secs must be positive".into(),
            ));
        }
        let t = &self.targets;
        if t.session_secs == 0 || t.rest_secs == 0 || t.daily_secs == 0 {
            return Err(AppError::Config("targets must be positive".into()));
        }
        if let Some(cmd) = &self.flash_cmd
            && cmd.is_empty()
        {
            return Err(AppError::Config("flash_cmd empty".into()));
        }
        Ok(())
    }
}

pub fn resolve_config_path(cli_value: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(p) = cli_value {
        return Ok(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG) {
        return Ok(PathBuf::from(p));
    }
    default_config_path().ok_or_else(|| AppError::Config("could not determine config dir".into()))
}

pub fn default_config_path() -> Option<PathBuf> {
    let pd = ProjectDirs::from("dev", "timeflash", "timeflash")?;
    Some(pd.config_dir().join("client.yaml"))
}

pub fn default_state_path() -> Option<PathBuf> {
    let pd = ProjectDirs::from("dev", "timeflash", "timeflash")?;
    Some(pd.data_dir().join("state.json"))
}

pub fn load_config(path: &Path) -> Result<AgentConfig, AppError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("read {} failed: {e}", path.display())))?;
    let cfg: AgentConfig = serde_yaml::from_str(&data)
        .map_err(|e| AppError::Config(format!("parse {} failed: {e}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}
