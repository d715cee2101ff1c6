use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use mime_guess::from_path;
use rust_embed::RustEmbed;
use std::path::{Component, Path, PathBuf};

#[derive(RustEmbed)]
#[folder = "public"]
pub struct Assets;

const ASSET_CACHE_CONTROL: &str = "public, max-age=3600";

/// Serve a public asset from the configured directory or the embedded copy
pub async fn serve_asset(path: String, public_dir: Option<String>) -> Response {
    let path = path.trim_start_matches('/');

    if !is_safe_path(path) {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    }

    if let Some(ref dir) = public_dir {
        let file_path = PathBuf::from(dir).join(path);
        if let Ok(content) = tokio::fs::read(&file_path).await {
            return asset_response(&file_path, content);
        }
    }

    match Assets::get(path) {
        Some(content) => asset_response(Path::new(path), content.data.into_owned()),
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

fn asset_response(path: &Path, content: Vec<u8>) -> Response {
    let mime = from_path(path).first_or_octet_stream();
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, ASSET_CACHE_CONTROL.to_string()),
        ],
        Body::from(content),
    )
        .into_response()
}

/// Only plain relative paths; no `..`, no absolute or prefixed components
fn is_safe_path(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
