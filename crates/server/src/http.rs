//! HTTP front.
//!
//! Every request not addressed to `/__tether/*` is handed to the worker. Requests
//! the worker does not intercept go to the network unchanged; if that fails too
//! the caller gets `502 Bad Gateway`. Absolute-form targets are only accepted for
//! the origin and the two font origins; anything else is `403 Forbidden`.
//!
//! ## Endpoints
//! - `GET /__tether/events?url=<page>&arch=<revision>` - server-sent events for an
//!   open window; a window served under another architecture is told to reload
//! - `GET /__tether/status` - revisions, active worker and cache sizes
//! - anything else - intercepted

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Request as HttpRequest, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tether_client::fetch::resolve;
use tether_client::{FetchResponse, Network, Request};
use tether_core::{AppConfig, CacheDb, CacheName, ConfigError, RevisionKey};
use tokio::signal;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use url::{Origin, Url};

use crate::error::FrontError;
use crate::router::Dispatch;
use crate::runtime::{ClientEvent, ClientRegistry, Clients};
use crate::worker::Worker;

#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<Worker>,
    pub network: Arc<dyn Network>,
    pub clients: Arc<ClientRegistry>,
    pub db: CacheDb,
    pub origin: Url,
    /// Origins a request may address: the site and the font hosts.
    pub upstreams: Vec<Origin>,
    /// Largest request body read before forwarding.
    pub max_bytes: usize,
}

impl AppState {
    pub fn new(
        config: &AppConfig, worker: Arc<Worker>, network: Arc<dyn Network>, clients: Arc<ClientRegistry>, db: CacheDb,
    ) -> Result<Self, ConfigError> {
        let origin = config.origin_url()?;
        let mut upstreams = vec![origin.origin()];
        for (field, value) in
            [("font_stylesheet_origin", &config.font_stylesheet_origin), ("font_file_origin", &config.font_file_origin)]
        {
            let url = Url::parse(value).map_err(|e| ConfigError::Invalid { field: field.into(), reason: e.to_string() })?;
            upstreams.push(url.origin());
        }

        Ok(Self { worker, network, clients, db, origin, upstreams, max_bytes: config.max_bytes })
    }
}

pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/__tether/events", get(events))
        .route("/__tether/status", get(status))
        .fallback(intercept)
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn serve(listen_addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, origin = %state.origin, "listening");

    axum::serve(listener, app(state)).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

/// The URL a request addresses: absolute-form targets keep their own, origin-form
/// targets are resolved against `origin`.
fn target_url(origin: &Url, uri: &Uri) -> Result<Url, FrontError> {
    let target = if uri.scheme().is_some() {
        uri.to_string()
    } else {
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string()
    };
    resolve(origin, &target).map_err(|e| FrontError::InvalidInput(e.to_string()))
}

fn into_response(response: FetchResponse) -> Response {
    (response.status, response.headers, response.bytes).into_response()
}

async fn intercept(State(state): State<AppState>, request: HttpRequest<Body>) -> Result<Response, FrontError> {
    let (parts, body) = request.into_parts();
    let url = target_url(&state.origin, &parts.uri)?;
    if !state.upstreams.contains(&url.origin()) {
        return Err(FrontError::ForbiddenTarget(url.origin().ascii_serialization()));
    }
    let body = axum::body::to_bytes(body, state.max_bytes)
        .await
        .map_err(|e| FrontError::InvalidInput(format!("request body: {e}")))?;
    let request = Request::get(url).with_headers(parts.headers).with_body(parts.method, body);

    match state.worker.handle(&request).await {
        Dispatch::Respond(response) => {
            tracing::debug!(url = %request.url, status = response.status.as_u16(), source = ?response.source, "intercepted");
            Ok(into_response(response))
        }
        Dispatch::Passthrough => {
            let response = state.network.fetch(&request).await.map_err(FrontError::BadGateway)?;
            Ok(into_response(response))
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    url: String,
    /// Architecture revision the page was served under.
    arch: Option<String>,
}

fn to_sse(event: ClientEvent) -> Event {
    match event {
        ClientEvent::Connected { id } => Event::default().event("connected").data(id.to_string()),
        ClientEvent::Navigate { url } => Event::default().event("navigate").data(url),
    }
}

/// Register a window. One served under an older architecture than the active one
/// missed the reload sent during activation, so it gets its own now.
async fn open_window(state: &AppState, query: EventsQuery) -> Result<ReceiverStream<ClientEvent>, FrontError> {
    let active = state.db.get_revision(RevisionKey::Architecture).await.map_err(FrontError::Internal)?;
    let (id, stream) = state.clients.connect(query.url.clone());

    if let Some(served) = query.arch
        && let Some(active) = active
        && served != active
    {
        tracing::info!(client = id, %served, %active, url = %query.url, "reloading window from an older architecture");
        if let Err(err) = state.clients.navigate(id, &query.url).await {
            tracing::warn!(client = id, "reload failed: {err}");
        }
    }

    Ok(stream)
}

async fn events(
    State(state): State<AppState>, Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, FrontError> {
    let stream = open_window(&state, query).await?;
    Ok(Sse::new(stream.map(|event| Ok(to_sse(event)))).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Serialize)]
struct StatusReport {
    architecture: Option<String>,
    resources: Option<String>,
    activated_at: Option<String>,
    connected_clients: usize,
    caches: BTreeMap<&'static str, u64>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusReport>, FrontError> {
    let architecture = state.db.get_revision(RevisionKey::Architecture).await.map_err(FrontError::Internal)?;
    let resources = state.db.get_revision(RevisionKey::Resources).await.map_err(FrontError::Internal)?;
    let active = state.db.active_worker().await.map_err(FrontError::Internal)?;

    let mut caches = BTreeMap::new();
    for cache in CacheName::ACTIVE {
        caches.insert(cache.as_str(), state.db.count_entries(cache).await.map_err(FrontError::Internal)?);
    }

    Ok(Json(StatusReport {
        architecture,
        resources,
        activated_at: active.map(|worker| worker.activated_at),
        connected_clients: state.clients.connected(),
        caches,
    }))
}
