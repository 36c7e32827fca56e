use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Auth, load_config};
use crate::paths::resolve_path;
use crate::repository::{NodeError, NodeRepository};
use crate::store::{FileBlobStore, NodeStore};

mod api;
mod web;

#[cfg(test)]
mod tests;

#[derive(Parser, Debug)]
#[command(name = "subpanel")]
#[command(author = "")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Subscription link admin panel", long_about = None)]
struct Cli {
    /// Path to panel.toml
    #[arg(long, default_value = "conf/panel.toml")]
    config: String,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let base_dir = PathBuf::from(".");
    let config = load_config(resolve_path(&base_dir, &args.config))?;

    let store_path = resolve_path(&base_dir, &config.store.path);
    let blob = FileBlobStore::new(store_path);
    info!(path = %blob.path().display(), "using node store");
    let repo = NodeRepository::new(
        NodeStore::new(Arc::new(blob)),
        config.store.reject_duplicate_links,
    );

    if config.auth.admin_token.as_deref().unwrap_or("").is_empty() {
        warn!("admin_token not configured, admin API is locked");
    }
    if config.auth.sub_token.as_deref().unwrap_or("").is_empty() {
        warn!("sub_token not configured, subscription feed is locked");
    }

    let state = AppState {
        repo: Arc::new(repo),
        auth: Arc::new(config.auth.clone()),
    };
    let app = build_router(state);

    let listen_addr = format!("{}:{}", config.server.listen, config.server.port);
    info!("binding admin panel to {listen_addr}");
    let listener = TcpListener::bind(&listen_addr)
        .await
        .context(format!("failed to bind {listen_addr}"))?;
    info!("server started on {listen_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_feed))
        .nest("/api", api::router(state.clone()))
        .route("/admin", get(web::handle_admin))
        .route("/admin/{*path}", get(web::handle_admin))
        .fallback(handle_404)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        version = ?req.version(),
                        remote = %req
                            .headers()
                            .get("X-Forwarded-For")
                            .and_then(|v| v.to_str().ok())
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    )
                })
                .on_request(|req: &axum::http::Request<_>, _span: &tracing::Span| {
                    info!(path = %req.uri().path(), "incoming request");
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = res.status();
                        if status.is_client_error() || status.is_server_error() {
                            warn!(status = %status, latency_ms = latency.as_millis(), "http response");
                        } else {
                            info!(status = %status, latency_ms = latency.as_millis(), "http response");
                        }
                    },
                )
                .on_failure(
                    |failure_class: ServerErrorsFailureClass,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        match failure_class {
                            ServerErrorsFailureClass::StatusCode(status) => {
                                warn!(status = %status, latency_ms = latency.as_millis(), "http failure");
                            }
                            ServerErrorsFailureClass::Error(error) => {
                                warn!(error = %error, latency_ms = latency.as_millis(), "http failure");
                            }
                        }
                    },
                ),
        )
        .with_state(state)
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<NodeRepository>,
    pub auth: Arc<Auth>,
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    token: Option<String>,
}

/// Plaintext feed: one link per line.
async fn handle_feed(State(state): State<AppState>, Query(params): Query<FeedQuery>) -> Response {
    if !token_matches(params.token.as_deref(), state.auth.sub_token.as_deref()) {
        warn!("subscription feed requested with invalid token");
        return StatusCode::FORBIDDEN.into_response();
    }

    let nodes = match with_repo(&state, |repo| repo.list_all()).await {
        Ok(nodes) => nodes,
        Err(err) => return err.into_response(),
    };
    info!(count = nodes.len(), "serving subscription feed");
    let body = nodes
        .iter()
        .map(|n| n.link.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Repository cycles do blocking file I/O under a std mutex, so they run on
/// the blocking pool instead of a runtime worker.
async fn with_repo<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&NodeRepository) -> T + Send + 'static,
    T: Send + 'static,
{
    let repo = state.repo.clone();
    tokio::task::spawn_blocking(move || f(&repo))
        .await
        .map_err(ApiError::internal)
}

/// An unset or empty expected token never matches.
pub(crate) fn token_matches(provided: Option<&str>, expected: Option<&str>) -> bool {
    match (provided, expected) {
        (Some(provided), Some(expected)) => !expected.is_empty() && provided == expected,
        _ => false,
    }
}

async fn handle_404(uri: axum::http::Uri) -> impl IntoResponse {
    warn!(uri = %uri.path(), "unmatched route");
    (StatusCode::NOT_FOUND, "not found")
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        let msg = format!("{err}");
        warn!(error = %msg, "internal error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg,
        }
    }
}

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::InvalidLink => Self::new(StatusCode::BAD_REQUEST, "Invalid link"),
            NodeError::DuplicateLink => Self::new(StatusCode::CONFLICT, "Duplicate link"),
            NodeError::NotFound(id) => {
                Self::new(StatusCode::NOT_FOUND, format!("Node {id} not found"))
            }
            NodeError::InvalidPayload(reason) => {
                warn!(reason = %reason, "rejected reorder payload");
                Self::new(StatusCode::BAD_REQUEST, "Invalid data")
            }
            err @ NodeError::Store(_) => Self::internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!(status = %self.status, message = %self.message, "client error");
        }
        let body = Json(serde_json::json!({
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}
