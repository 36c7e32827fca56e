use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::logging;
use crate::repository::{BulkImport, NewNode, NodeError, NodePatch};
use crate::store::{Node, NodeId};

use super::{ApiError, AppState, token_matches, with_repo};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/nodes", get(list_nodes).post(create_node))
        .route("/nodes/{id}", put(update_node).delete(delete_node))
        .route("/nodes/bulk", post(bulk_import))
        .route("/nodes/reorder", post(reorder_nodes))
        .route("/bulk", post(bulk_import))
        .route("/logs", get(get_logs))
        .layer(axum::middleware::from_fn_with_state(state, api_auth))
        .layer(axum::middleware::from_fn(api_no_cache))
}

#[derive(Deserialize)]
struct NodeRequest {
    link: Option<Value>,
    name: Option<String>,
    priority: Option<i64>,
}

#[derive(Deserialize)]
struct BulkRequest {
    #[serde(default)]
    text: String,
    name: Option<String>,
    priority: Option<i64>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
struct BulkResponse {
    ok: bool,
    added: usize,
    skipped: usize,
}

#[derive(Serialize)]
struct LogResponse {
    items: Vec<String>,
}

#[derive(Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

async fn api_no_cache(req: axum::http::Request<Body>, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    res
}

async fn api_auth(
    State(state): State<AppState>,
    req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let provided = extract_token(&req);
    if !token_matches(provided.as_deref(), state.auth.admin_token.as_deref()) {
        warn!(path = %req.uri().path(), "admin API request with invalid token");
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(req).await
}

/// `?token=` first, then `Authorization: Bearer`.
fn extract_token(req: &axum::http::Request<Body>) -> Option<String> {
    let from_query = Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.token);
    from_query.or_else(|| bearer_token(req.headers()))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => {
            Some(token.to_string())
        }
        _ => None,
    }
}

/// Non-string links are kept as their JSON text so they fail validation.
fn link_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

async fn list_nodes(State(state): State<AppState>) -> Result<Json<Vec<Node>>, ApiError> {
    let nodes = with_repo(&state, |repo| repo.list_all()).await?;
    Ok(Json(nodes))
}

async fn create_node(
    State(state): State<AppState>,
    Json(body): Json<NodeRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let input = NewNode {
        link: link_text(body.link).unwrap_or_default(),
        name: body.name,
        priority: body.priority,
    };
    with_repo(&state, move |repo| repo.create(input)).await??;
    Ok(Json(OkResponse { ok: true }))
}

/// Any JSON number is a valid id; anything else cannot name a node.
async fn update_node(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(body): Json<NodeRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let Ok(id) = raw.parse::<NodeId>() else {
        return Err(NodeError::NotFound(raw).into());
    };
    let patch = NodePatch {
        link: link_text(body.link),
        name: body.name,
        priority: body.priority,
    };
    with_repo(&state, move |repo| repo.update(&id, patch)).await??;
    Ok(Json(OkResponse { ok: true }))
}

async fn delete_node(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    match raw.parse::<NodeId>() {
        Ok(id) => {
            with_repo(&state, move |repo| repo.remove(&id)).await??;
        }
        Err(_) => debug!(id = %raw, "delete of non-numeric id ignored"),
    }
    Ok(Json(OkResponse { ok: true }))
}

async fn bulk_import(
    State(state): State<AppState>,
    Json(body): Json<BulkRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    let input = BulkImport {
        text: body.text,
        name: body.name,
        priority: body.priority,
    };
    let outcome = with_repo(&state, move |repo| repo.bulk_create(input)).await??;
    Ok(Json(BulkResponse {
        ok: true,
        added: outcome.added,
        skipped: outcome.skipped,
    }))
}

async fn reorder_nodes(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<OkResponse>, ApiError> {
    with_repo(&state, move |repo| repo.reorder(body)).await??;
    Ok(Json(OkResponse { ok: true }))
}

async fn get_logs(Query(query): Query<LogQuery>) -> Json<LogResponse> {
    Json(LogResponse {
        items: logging::get_logs(query.limit),
    })
}
