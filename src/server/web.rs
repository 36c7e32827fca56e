use axum::{
    body::Body,
    http::{HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use include_dir::{Dir, include_dir};
use mime_guess::from_path;
use tracing::warn;

static ADMIN_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/web/admin");

/// Serve the embedded admin UI under `/admin`.
pub async fn handle_admin(req: Request<Body>) -> impl IntoResponse {
    let path = asset_path(req.uri().path());
    if let Some(response) = serve_path(&path) {
        return response;
    }

    warn!(path = %req.uri().path(), "admin asset not found");
    (StatusCode::NOT_FOUND, "not found").into_response()
}

fn asset_path(uri_path: &str) -> String {
    let rel = uri_path
        .strip_prefix("/admin")
        .unwrap_or(uri_path)
        .trim_start_matches('/');
    if rel.is_empty() || rel.ends_with('/') {
        format!("{rel}index.html")
    } else {
        rel.to_string()
    }
}

fn serve_path(path: &str) -> Option<Response> {
    let file = ADMIN_DIR.get_file(path)?;
    let mime = from_path(path).first_or_octet_stream();
    let mut response = Response::new(Body::from(file.contents().to_vec()));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.as_ref()).ok()?,
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control_for(path)));
    Some(response)
}

fn cache_control_for(path: &str) -> &'static str {
    if path.ends_with(".html") {
        return "no-cache";
    }
    "public, max-age=3600"
}
