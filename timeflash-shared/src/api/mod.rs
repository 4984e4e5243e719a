use serde::{Deserialize, Serialize};

use crate::domain::{DailyValues, IdleState, Metric, Metrics};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

/// Port carrying the compact icon snapshot.
pub const PORT_FLASH: &str = "flash";
/// Port carrying the full snapshot for the details view.
pub const PORT_DETAILS: &str = "details";
/// Port carrying the error badge as soon as it changes.
pub const PORT_BADGE: &str = "badge";

pub fn port_scope(name: &str) -> String {
    format!("{}/ports/{}", API_V1_PREFIX, endpoints::enc(name))
}

/// A change requested by a UI surface. The agent stamps the time on receipt.
///
/// Wire form is a single-key object, e.g. `{"monitored": false}` or
/// `{"idleState": "active"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Change {
    IdleState(IdleState),
    Monitored(bool),
    Target { name: String, seconds: f64 },
}

// Broadcast payloads

#[derive(Debug, Clone, Serialize)]
pub struct FlashMessage {
    pub monitored: bool,
    pub metrics: Vec<Metric>,
    /// Present once any error has been reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<Badge>,
}

/// Badge drawn over the icon, e.g. the error count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsMessage {
    pub monitored: bool,
    pub metrics: Metrics,
    pub first_week: bool,
    pub daily_values: DailyValues,
}
