//! One-shot commands that run without the agent loop.

use std::time::Duration;

use timeflash_shared::Time;
use timeflash_shared::api::DetailsMessage;
use tracing::info;

use crate::config::AgentConfig;
use crate::flash::FlashController;
use crate::model::{BudgetModel, Model};
use crate::report::ErrorReporter;
use crate::store::StateStore;
use crate::{AppError, platform};

/// Shows a single flash so the configured backend can be checked by eye.
pub async fn run_flash(cfg: &AgentConfig, close_after: Duration) -> Result<(), AppError> {
    let plat = platform::detect(cfg).await?;
    plat.initialize_process();
    let flash = FlashController::new(plat.clone(), ErrorReporter::new(plat));
    info!(?close_after, "showing test flash");
    flash.flash(close_after).await
}

/// Prints the stored state's current snapshot as JSON.
pub async fn print_status(cfg: &AgentConfig) -> Result<(), AppError> {
    let store = StateStore::new(cfg.state_path()?);
    let state = store.load().await?.ok_or_else(|| {
        AppError::Store(format!("no state stored at {}", store.path().display()))
    })?;
    let details = status_snapshot(cfg, state, &Time::now())?;
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

pub fn status_snapshot(
    cfg: &AgentConfig,
    state: crate::model::ModelState,
    time: &Time,
) -> Result<DetailsMessage, AppError> {
    let monitored = state.monitored;
    let first_week = state.first_week;
    let daily_values = state.daily_values.clone();
    let mut model = BudgetModel::new(cfg.idle_delay(), cfg.keep_active_period());
    model.load(state);
    Ok(DetailsMessage {
        monitored,
        metrics: model.metrics(time)?,
        first_week,
        daily_values,
    })
}
