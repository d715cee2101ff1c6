use axum::{
    extract::Path,
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::FrontendConfig;
use crate::counter::CounterService;

use super::handlers::{health_check, hit, stats, AppState};
use super::static_files::serve_asset;

pub fn create_router(counter: Arc<CounterService>, frontend: FrontendConfig) -> Router {
    let state = Arc::new(AppState { counter });

    // Client pages embed the script cross-origin, so everything is open.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let script_dir = frontend.public_dir.clone();
    let assets_dir = frontend.public_dir;

    Router::new()
        .route("/health", get(health_check))
        .route("/hit", get(hit).post(hit))
        .route("/stats", get(stats))
        .route(
            "/counter.js",
            get(move || serve_asset("counter.js".to_string(), script_dir.clone())),
        )
        .route(
            "/public/{*path}",
            get(move |Path(path): Path<String>| serve_asset(path, assets_dir.clone())),
        )
        .layer(cors)
        .with_state(state)
}
