use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::util::ServiceExt;

use super::{AppState, build_router};
use crate::config::Auth;
use crate::repository::NodeRepository;
use crate::store::{FileBlobStore, NodeStore};

const ADMIN: &str = "admin-token";
const SUB: &str = "sub-token";

fn app_with(tmp: &TempDir, reject_duplicate_links: bool) -> axum::Router {
    let blob = FileBlobStore::new(tmp.path().join("nodes.json"));
    let repo = NodeRepository::new(NodeStore::new(Arc::new(blob)), reject_duplicate_links);
    build_router(AppState {
        repo: Arc::new(repo),
        auth: Arc::new(Auth {
            admin_token: Some(ADMIN.to_string()),
            sub_token: Some(SUB.to_string()),
        }),
    })
}

fn app(tmp: &TempDir) -> axum::Router {
    app_with(tmp, false)
}

fn req(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn req_json(method: &str, uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

async fn body_bytes(res: axum::response::Response) -> Vec<u8> {
    res.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(res: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(res).await).unwrap()
}

async fn list(app: &axum::Router) -> Vec<Value> {
    let res = app
        .clone()
        .oneshot(req("GET", &format!("/api/nodes?token={ADMIN}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    match body_json(res).await {
        Value::Array(items) => items,
        other => panic!("expected array, got {other}"),
    }
}

async fn add(app: &axum::Router, body: Value) -> StatusCode {
    app.clone()
        .oneshot(req_json("POST", &format!("/api/nodes?token={ADMIN}"), body))
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn admin_api_requires_token() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);

    let sub_token_uri = format!("/api/nodes?token={SUB}");
    for uri in ["/api/nodes", "/api/nodes?token=wrong", sub_token_uri.as_str()] {
        let res = app.clone().oneshot(req("GET", uri)).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(body_bytes(res).await.is_empty());
    }

    let res = app
        .clone()
        .oneshot(req_json("POST", "/api/nodes", json!({"link": "vmess://a"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(list(&app).await.is_empty());
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/nodes")
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store, no-cache, must-revalidate"
    );
}

#[tokio::test]
async fn unconfigured_tokens_lock_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let blob = FileBlobStore::new(tmp.path().join("nodes.json"));
    let app = build_router(AppState {
        repo: Arc::new(NodeRepository::new(NodeStore::new(Arc::new(blob)), false)),
        auth: Arc::new(Auth {
            admin_token: Some(String::new()),
            sub_token: None,
        }),
    });

    let res = app.clone().oneshot(req("GET", "/api/nodes?token=")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.oneshot(req("GET", "/?token=")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_list_and_feed() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);

    assert_eq!(
        add(&app, json!({"link": "vless://a@h:1#x", "name": "hk node", "priority": 3})).await,
        StatusCode::OK
    );
    assert_eq!(add(&app, json!({"link": "vless://b@h:2", "name": "hk node"})).await, StatusCode::OK);

    let nodes = list(&app).await;
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["id"], 1);
    assert_eq!(nodes[0]["name"], "hk-node");
    assert_eq!(nodes[0]["link"], "vless://a@h:1#hk-node");
    assert_eq!(nodes[0]["priority"], 3);
    assert!(nodes[0]["created"].is_string());
    assert_eq!(nodes[1]["name"], "hk-node-1");

    let res = app.clone().oneshot(req("GET", "/?token=nope")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app.oneshot(req("GET", &format!("/?token={SUB}"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    let body = String::from_utf8(body_bytes(res).await).unwrap();
    assert_eq!(body, "vless://a@h:1#hk-node\nvless://b@h:2#hk-node-1");
}

#[tokio::test]
async fn create_rejects_bad_links() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);

    for body in [json!({"link": "http://abc"}), json!({"link": 42}), json!({})] {
        let res = app
            .clone()
            .oneshot(req_json("POST", &format!("/api/nodes?token={ADMIN}"), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await, json!({"error": "Invalid link"}));
    }
    assert!(list(&app).await.is_empty());
    assert!(!tmp.path().join("nodes.json").exists());
}

#[tokio::test]
async fn duplicate_link_conflicts_when_enabled() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app_with(&tmp, true);

    assert_eq!(add(&app, json!({"link": "vless://a"})).await, StatusCode::OK);
    assert_eq!(add(&app, json!({"link": "vless://a#other"})).await, StatusCode::CONFLICT);
    assert_eq!(list(&app).await.len(), 1);
}

#[tokio::test]
async fn update_and_delete() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    add(&app, json!({"link": "vless://a", "name": "a"})).await;
    add(&app, json!({"link": "vless://b", "name": "b"})).await;

    let res = app
        .clone()
        .oneshot(req_json(
            "PUT",
            &format!("/api/nodes/2?token={ADMIN}"),
            json!({"name": "a", "priority": 9}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!({"ok": true}));

    let nodes = list(&app).await;
    assert_eq!(nodes[1]["name"], "a-1");
    assert_eq!(nodes[1]["link"], "vless://b#a-1");
    assert_eq!(nodes[1]["priority"], 9);

    let res = app
        .clone()
        .oneshot(req_json(
            "PUT",
            &format!("/api/nodes/1?token={ADMIN}"),
            json!({"link": "trojan://x"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(req_json("PUT", &format!("/api/nodes/77?token={ADMIN}"), json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    for _ in 0..2 {
        let res = app
            .clone()
            .oneshot(req("DELETE", &format!("/api/nodes/1?token={ADMIN}")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let nodes = list(&app).await;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["id"], 2);
}

#[tokio::test]
async fn bulk_import_on_both_routes() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);

    let res = app
        .clone()
        .oneshot(req_json(
            "POST",
            &format!("/api/bulk?token={ADMIN}"),
            json!({"text": "vmess://a\nbad-link\nvless://b", "name": "batch"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!({"ok": true, "added": 2, "skipped": 1}));

    let res = app
        .clone()
        .oneshot(req_json(
            "POST",
            &format!("/api/nodes/bulk?token={ADMIN}"),
            json!({"text": "vless://c", "name": "batch"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await, json!({"ok": true, "added": 1, "skipped": 0}));

    let names: Vec<Value> = list(&app).await.into_iter().map(|n| n["name"].clone()).collect();
    assert_eq!(names, [json!("batch"), json!("batch-1"), json!("batch-2")]);
}

#[tokio::test]
async fn reorder_replaces_order() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    add(&app, json!({"link": "vless://a", "name": "a"})).await;
    add(&app, json!({"link": "vless://b", "name": "b"})).await;

    let mut nodes = list(&app).await;
    nodes.reverse();
    let res = app
        .clone()
        .oneshot(req_json(
            "POST",
            &format!("/api/nodes/reorder?token={ADMIN}"),
            json!({ "data": nodes }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ids: Vec<Value> = list(&app).await.into_iter().map(|n| n["id"].clone()).collect();
    assert_eq!(ids, [json!(2), json!(1)]);

    let res = app
        .clone()
        .oneshot(req_json(
            "POST",
            &format!("/api/nodes/reorder?token={ADMIN}"),
            json!({"data": {"id": 1}}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await, json!({"error": "Invalid data"}));
    assert_eq!(list(&app).await.len(), 2);
}

#[tokio::test]
async fn corrupt_store_reads_as_empty() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("nodes.json"), "{ broken").unwrap();
    let app = app(&tmp);

    assert!(list(&app).await.is_empty());
    assert_eq!(add(&app, json!({"link": "vmess://a"})).await, StatusCode::OK);
    assert_eq!(list(&app).await.len(), 1);
}

#[tokio::test]
async fn wall_clock_ids_survive_list_and_create() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("nodes.json"),
        r#"[{"id":1700000000000,"name":"a","link":"vmess://a#a"},{"id":1700000000001.42,"name":"b","link":"vless://b#b"}]"#,
    )
    .unwrap();
    let app = app(&tmp);

    let nodes = list(&app).await;
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1]["id"], json!(1700000000001.42));

    assert_eq!(add(&app, json!({"link": "vless://c", "name": "c"})).await, StatusCode::OK);
    let nodes = list(&app).await;
    let names: Vec<Value> = nodes.iter().map(|n| n["name"].clone()).collect();
    assert_eq!(names, [json!("a"), json!("b"), json!("c")]);
    assert_eq!(nodes[2]["id"], json!(1_700_000_000_002u64));

    let res = app
        .clone()
        .oneshot(req_json(
            "PUT",
            &format!("/api/nodes/1700000000001.42?token={ADMIN}"),
            json!({"name": "bee"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(list(&app).await[1]["link"], "vless://b#bee");

    let res = app
        .clone()
        .oneshot(req("DELETE", &format!("/api/nodes/1700000000001.42?token={ADMIN}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(list(&app).await.len(), 2);
}

#[tokio::test]
async fn unknown_or_malformed_ids_in_path() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);

    for id in ["abc", "1.5"] {
        let res = app
            .clone()
            .oneshot(req("DELETE", &format!("/api/nodes/{id}?token={ADMIN}")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({"ok": true}));
    }
    // Deleting from a never-written store does not create it.
    assert!(!tmp.path().join("nodes.json").exists());

    let res = app
        .clone()
        .oneshot(req_json("PUT", &format!("/api/nodes/abc?token={ADMIN}"), json!({"name": "x"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res).await, json!({"error": "Node abc not found"}));
}

#[tokio::test]
async fn admin_page_and_fallback() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);

    let res = app.clone().oneshot(req("GET", "/admin")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );

    let res = app.clone().oneshot(req("GET", "/admin/app.js")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.oneshot(req("GET", "/nowhere")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logs_endpoint_is_admin_only() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);

    let res = app.clone().oneshot(req("GET", "/api/logs")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .oneshot(req("GET", &format!("/api/logs?token={ADMIN}&limit=5")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_json(res).await["items"].is_array());
}
