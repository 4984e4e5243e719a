//! Named UI ports served over HTTP.
//!
//! A UI surface opens a port with `GET /api/v1/ports/{name}` and receives
//! JSON snapshots as server-sent events. Only one listener per name is kept;
//! a new connection replaces the previous one. Sending to a port nobody
//! listens on is a silent no-op.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::Stream;
use serde::Serialize;
use timeflash_shared::api::{API_V1_PREFIX, Change};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn};

use crate::AppError;
use crate::app::agent::AgentEvent;

/// Snapshots buffered per listener. A listener that falls behind loses the
/// newest messages instead of growing the queue.
pub const PORT_QUEUE: usize = 8;

struct Port {
    id: u64,
    tx: mpsc::Sender<String>,
}

#[derive(Clone, Default)]
pub struct PortHub {
    ports: Arc<Mutex<HashMap<String, Port>>>,
    next_id: Arc<AtomicU64>,
}

/// Receiving side of a connected port.
pub struct PortConnection {
    pub id: u64,
    pub name: String,
    pub rx: mpsc::Receiver<String>,
}

impl PortHub {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Port>> {
        // Entries are plain data; a poisoned map is still consistent.
        self.ports.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn connect(&self, name: &str) -> PortConnection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(PORT_QUEUE);
        if self.lock().insert(name.to_string(), Port { id, tx }).is_some() {
            debug!(port = name, "replaced existing port listener");
        }
        PortConnection {
            id,
            name: name.to_string(),
            rx,
        }
    }

    /// Removes the port only if `id` is still the current listener.
    pub fn disconnect(&self, name: &str, id: u64) {
        let mut ports = self.lock();
        if ports.get(name).is_some_and(|p| p.id == id) {
            ports.remove(name);
            debug!(port = name, "port disconnected");
        }
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Serializes `msg` and hands it to the port's listener. Returns whether
    /// it was queued; a missing, gone or lagging listener gets nothing.
    pub fn send<T: Serialize>(&self, name: &str, msg: &T) -> Result<bool, AppError> {
        let mut ports = self.lock();
        let Some(port) = ports.get(name) else {
            return Ok(false);
        };
        let body = serde_json::to_string(msg)?;
        match port.tx.try_send(body) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(port = name, "listener lagging; message dropped");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                ports.remove(name);
                Ok(false)
            }
        }
    }
}

/// SSE stream for one port connection. Dropping it disconnects the port.
pub struct PortStream {
    hub: PortHub,
    conn: PortConnection,
}

impl PortStream {
    pub fn new(hub: PortHub, conn: PortConnection) -> Self {
        Self { hub, conn }
    }
}

impl Stream for PortStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.conn
            .rx
            .poll_recv(cx)
            .map(|msg| msg.map(|data| Ok(Event::default().event(&this.conn.name).data(data))))
    }
}

impl Drop for PortStream {
    fn drop(&mut self) {
        self.hub.disconnect(&self.conn.name, self.conn.id);
    }
}

#[derive(Clone)]
pub struct PortState {
    pub hub: PortHub,
    pub events: mpsc::Sender<AgentEvent>,
}

pub fn router(state: PortState) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
        )
    });

    Router::new()
        .route("/healthz", get(health))
        .route(
            &format!("{API_V1_PREFIX}/ports/{{name}}"),
            get(open_port).post(post_change),
        )
        .with_state(state)
        .layer(trace)
}

async fn health() -> &'static str {
    "ok"
}

async fn open_port(
    State(state): State<PortState>,
    Path(name): Path<String>,
) -> Sse<KeepAliveStream<PortStream>> {
    let conn = state.hub.connect(&name);
    info!(port = %name, "port connected");
    if state
        .events
        .send(AgentEvent::PortConnected(name))
        .await
        .is_err()
    {
        warn!("agent stopped; port will stay silent");
    }
    Sse::new(PortStream::new(state.hub.clone(), conn)).keep_alive(KeepAlive::default())
}

async fn post_change(
    State(state): State<PortState>,
    Path(name): Path<String>,
    Json(change): Json<Change>,
) -> StatusCode {
    debug!(port = %name, ?change, "change received");
    match state.events.send(AgentEvent::Change(change)).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Serves the port API until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: PortState,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let addr = listener.local_addr()?;
    info!(%addr, "port server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}
