//! Minimal REST client helpers for UI surfaces talking to a running agent.

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        // The agent is local; anything slower than this is a hung agent
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client")
});

async fn handle_empty(res: reqwest::Response) -> Result<(), RestError> {
    let status = res.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = res.text().await.unwrap_or_default();
        Err(RestError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

pub async fn health(base: &str) -> Result<(), RestError> {
    let res = HTTP_CLIENT
        .get(ep::healthz(base))
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_empty(res).await
}

/// Posts a change through the named port, as a connected UI would.
pub async fn post_change(base: &str, port: &str, change: &Change) -> Result<(), RestError> {
    let res = HTTP_CLIENT
        .post(ep::port(base, port))
        .json(change)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_empty(res).await
}
