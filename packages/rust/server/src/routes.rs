//! HTTP routes of the build server.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{Stream, StreamExt};
use rnws_shared::{Platform, RnwsError};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::hot::HotChannel;
use crate::source::{BundleRequest, BundleSource};

/// Body of `GET /status`, matching the packager's own liveness check.
pub(crate) const STATUS_BODY: &str = "packager-status:running";

/// Path of the Server-Sent Events endpoint when hot reload is enabled.
pub(crate) const HOT_PATH: &str = "/__hot__";

#[derive(Clone)]
pub(crate) struct AppState {
    pub source: Arc<dyn BundleSource>,
    pub hot: Option<Arc<HotChannel>>,
    pub dev: bool,
    pub minify: bool,
}

#[derive(Debug, Default, Deserialize)]
struct BundleQuery {
    platform: Option<String>,
    dev: Option<bool>,
    minify: Option<bool>,
}

/// Build the router: one `/<entry>.bundle` route per configured entry.
pub(crate) fn router(state: AppState, entries: &[String]) -> Router {
    let mut router = Router::new().route("/status", get(status));

    if let Some(channel) = state.hot.clone() {
        router = router.route(HOT_PATH, get(move || hot_events(channel)));
    }

    let mut routed: Vec<&str> = Vec::with_capacity(entries.len());
    for entry in entries {
        if routed.contains(&entry.as_str()) {
            continue;
        }
        routed.push(entry);

        let name = entry.clone();
        router = router.route(
            &format!("/{entry}.bundle"),
            get(move |state: State<AppState>, query: Query<BundleQuery>| {
                serve_bundle(state, query, name)
            }),
        );
    }

    router
        .fallback(unknown_path)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status() -> &'static str {
    STATUS_BODY
}

async fn unknown_path(uri: axum::http::Uri) -> ServeError {
    ServeError::NotFound(format!("no bundle is served at {}", uri.path()))
}

async fn serve_bundle(
    State(state): State<AppState>,
    Query(query): Query<BundleQuery>,
    entry: String,
) -> Result<Response, ServeError> {
    let platform = match query.platform.as_deref() {
        Some(p) => Some(p.parse::<Platform>().map_err(ServeError::BadRequest)?),
        None => Platform::from_entry_name(&entry),
    };

    let request = BundleRequest {
        entry,
        platform,
        dev: query.dev.unwrap_or(state.dev),
        minify: query.minify.unwrap_or(state.minify),
    };

    let body = state.source.bundle(&request).await.map_err(|e| {
        warn!(entry = %request.entry, error = %e, "bundle request failed");
        ServeError::Bundle(e)
    })?;

    if let Some(hot) = &state.hot {
        hot.record(&request.entry, &body).await;
    }

    Ok((
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Stream hot reload events until the channel is closed.
async fn hot_events(
    channel: Arc<HotChannel>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(channel.subscribe())
        .filter_map(|message| {
            // Lagged receivers skip what they missed
            let event = message
                .ok()
                .and_then(|event| Event::default().event("update").json_data(event).ok());
            futures::future::ready(event.map(Ok))
        })
        .take_until(channel.closed());

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Errors returned to HTTP clients as plain text.
#[derive(Debug)]
pub(crate) enum ServeError {
    NotFound(String),
    BadRequest(String),
    Bundle(RnwsError),
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Bundle(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
        };
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}
