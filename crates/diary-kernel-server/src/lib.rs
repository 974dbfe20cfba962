//! The embedded host's HTTP server: serves the UI bundle to browsers on the
//! local network, executes repository operations POSTed by remote clients
//! against the host-native store, and delivers change notifications to each
//! connected client through a long-poll endpoint with per-client pending
//! queues.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};

use diary_kernel_core::{Category, ChangeBus, OpKind, OpRequest, Provenance};
use diary_kernel_store_sqlite::SqliteStore;

/// How long `/events` holds a poll open before answering with an empty list.
pub const DEFAULT_POLL_WINDOW: Duration = Duration::from_secs(30);

/// The marker in the served UI bundle replaced with injected runtime
/// globals, so the page knows to boot as a remote client of this host.
const RUNTIME_GLOBALS_MARKER: &str = "window.process =";

struct ClientQueue {
    pending: Vec<String>,
    notify: Arc<Notify>,
}

/// Per-client pending change-category queues. Clients are tracked from
/// their first poll onward and never evicted; the bounded cost per client is
/// one queue plus, while a poll is open, one parked handler task.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientQueue>>,
}

impl ClientRegistry {
    fn track(&self, client_id: &str) -> Arc<Notify> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientQueue { pending: Vec::new(), notify: Arc::new(Notify::new()) });
        Arc::clone(&queue.notify)
    }

    /// Queue a category name for every tracked client except the write's own
    /// originator. Called from the write path; polls drain concurrently.
    pub fn enqueue(&self, category: Category, origin_client: Option<&str>) {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        for (client_id, queue) in clients.iter_mut() {
            if Some(client_id.as_str()) == origin_client {
                continue;
            }
            queue.pending.push(category.as_str().to_string());
            queue.notify.notify_one();
        }
    }

    fn drain(&self, client_id: &str) -> Vec<String> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.get_mut(client_id).map(|queue| std::mem::take(&mut queue.pending)).unwrap_or_default()
    }

    /// Block up to `window` for at least one pending category, then return
    /// the accumulated list; empty on timeout.
    pub async fn wait(&self, client_id: &str, window: Duration) -> Vec<String> {
        let notify = self.track(client_id);
        let deadline = tokio::time::Instant::now() + window;

        loop {
            let pending = self.drain(client_id);
            if !pending.is_empty() {
                return pending;
            }
            if tokio::time::timeout_at(deadline, notify.notified()).await.is_err() {
                return self.drain(client_id);
            }
        }
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<SqliteStore>,
    pub bus: Arc<ChangeBus>,
    pub clients: Arc<ClientRegistry>,
    pub assets_dir: PathBuf,
    pub base_url: String,
    pub poll_window: Duration,
}

/// Open the host-native store and wire the change-notification fan-out into
/// the per-client queues.
///
/// # Errors
/// Returns an error when the store cannot be opened.
pub fn build_state(
    db: &Path,
    assets_dir: PathBuf,
    base_url: String,
    poll_window: Duration,
) -> Result<ServerState> {
    let bus = Arc::new(ChangeBus::new());
    let store = Arc::new(SqliteStore::open(db, Arc::clone(&bus))?);
    let clients = Arc::new(ClientRegistry::default());

    let fanout = Arc::clone(&clients);
    bus.subscribe(None, move |event| {
        fanout.enqueue(event.category, event.provenance.client_id());
    });

    Ok(ServerState { store, bus, clients, assets_dir, base_url, poll_window })
}

/// Remote clients and the host server run on different origins, so every
/// response is served with permissive cross-origin headers.
pub fn app(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(index).post(execute_op))
        .route("/events", get(poll_events))
        .route("/*path", get(static_asset))
        .layer(cors)
        .with_state(state)
}

/// First non-loopback IPv4 this host would route out of, used to build the
/// base URL injected into the served page.
#[must_use]
pub fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

async fn index(State(state): State<ServerState>) -> Response {
    let path = state.assets_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
            let injected = content.replace(
                RUNTIME_GLOBALS_MARKER,
                &format!(
                    "window.clientMode = true; window.serverBaseUrl = '{}'; {RUNTIME_GLOBALS_MARKER}",
                    state.base_url
                ),
            );
            Html(injected).into_response()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "UI bundle not readable");
            (StatusCode::NOT_FOUND, "404 Not Found").into_response()
        }
    }
}

fn mime_for(path: &str) -> &'static str {
    if path.ends_with(".html") {
        "text/html"
    } else if path.ends_with(".js") {
        "application/javascript"
    } else if path.ends_with(".css") {
        "text/css"
    } else if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

async fn static_asset(
    State(state): State<ServerState>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    if path.split('/').any(|part| part == "..") {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    }

    let full = state.assets_dir.join(&path);
    match tokio::fs::read(&full).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, mime_for(&path))], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    id: String,
}

async fn poll_events(
    State(state): State<ServerState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<String>> {
    let pending = state.clients.wait(&query.id, state.poll_window).await;
    Json(pending)
}

#[derive(Debug, Deserialize)]
struct OpQuery {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

fn bad_request() -> Response {
    let body =
        ErrorBody { success: false, message: "Error processing request".to_string() };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

async fn execute_op(
    State(state): State<ServerState>,
    Query(query): Query<OpQuery>,
    body: Bytes,
) -> Response {
    let request: OpRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "malformed operation payload");
            return bad_request();
        }
    };

    let provenance = Provenance::Client { client_id: query.id };
    match run_op(&state, &request, &provenance) {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            tracing::warn!(store_name = %request.store_name, error = %err, "operation rejected");
            bad_request()
        }
    }
}

fn run_op(state: &ServerState, request: &OpRequest, provenance: &Provenance) -> Result<Value> {
    let category = request.category()?;

    match request.kind {
        OpKind::GetAll => Ok(Value::Array(state.store.get_all(category)?)),
        OpKind::Get => {
            let id = request.id.as_deref().ok_or_else(|| anyhow!("get requires an id"))?;
            Ok(state.store.get(category, id)?.unwrap_or(Value::Null))
        }
        OpKind::Insert => {
            let data = request.data.as_ref().ok_or_else(|| anyhow!("insert requires data"))?;
            state.store.insert(category, data, provenance)?;
            Ok(Value::Array(Vec::new()))
        }
        OpKind::Update => {
            let id = request.id.as_deref().ok_or_else(|| anyhow!("update requires an id"))?;
            let data = request.data.as_ref().ok_or_else(|| anyhow!("update requires data"))?;
            state.store.update(category, id, data, provenance)?;
            Ok(Value::Array(Vec::new()))
        }
        OpKind::Delete => {
            let id = request.id.as_deref().ok_or_else(|| anyhow!("delete requires an id"))?;
            state.store.remove(category, id, provenance)?;
            Ok(Value::Array(Vec::new()))
        }
        OpKind::Import => {
            let records = request
                .data
                .as_ref()
                .and_then(Value::as_array)
                .context("import requires a record list")?;
            state.store.import(category, records, provenance)?;
            Ok(Value::Array(Vec::new()))
        }
    }
}
