use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::extract::PeerAddr;
use crate::counter::ip::resolve_client_address;
use crate::counter::{CounterError, CounterService, StatsOptions};

pub struct AppState {
    pub counter: Arc<CounterService>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub msg: String,
}

/// `{ "ok": true, ...body }`
#[derive(Serialize)]
pub struct OkResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> OkResponse<T> {
    fn new(body: T) -> Self {
        Self { ok: true, body }
    }
}

/// Error wrapper mapping counter failures onto HTTP statuses
pub enum ApiError {
    Counter(CounterError),
    /// Query string axum could not deserialize, e.g. a repeated `d`
    MalformedQuery(QueryRejection),
}

impl From<CounterError> for ApiError {
    fn from(e: CounterError) -> Self {
        Self::Counter(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::MalformedQuery(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match self {
            ApiError::MalformedQuery(rejection) => {
                tracing::debug!(error = %rejection, "rejected malformed query string");
                (
                    StatusCode::BAD_REQUEST,
                    CounterError::InvalidDomain.code(),
                    rejection.body_text(),
                )
            }
            ApiError::Counter(e) => {
                let status = match &e {
                    CounterError::InvalidDomain | CounterError::InvalidProject => {
                        StatusCode::BAD_REQUEST
                    }
                    CounterError::DomainNotAllowed => StatusCode::FORBIDDEN,
                    CounterError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };

                if e.is_client_error() {
                    tracing::debug!(code = e.code(), "rejected counter request");
                } else {
                    tracing::error!(error = %e, "counter storage failure");
                }

                (status, e.code(), e.to_string())
            }
        };

        let body = ErrorResponse {
            ok: false,
            error: code.to_string(),
            msg,
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct HitQuery {
    pub d: Option<String>,
    pub p: Option<String>,
    pub debug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub d: Option<String>,
    pub p: Option<String>,
    pub include_ips: Option<String>,
    pub include_projects: Option<String>,
}

fn is_truthy(flag: Option<&str>) -> bool {
    flag.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

/// Record a hit
///
/// Mounted for both GET and POST, since `navigator.sendBeacon` always posts.
/// Answers `204 No Content` like a tracking pixel, or echoes the recorded hit
/// as JSON when `debug` is set.
pub async fn hit(
    State(state): State<Arc<AppState>>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    query: Result<Query<HitQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let address = resolve_client_address(&headers, peer);
    let receipt = state
        .counter
        .hit(
            query.d.as_deref().unwrap_or_default(),
            query.p.as_deref(),
            &address,
        )
        .await?;

    if is_truthy(query.debug.as_deref()) {
        Ok(Json(OkResponse::new(receipt)).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

/// Current totals for a domain or one of its projects
pub async fn stats(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let options = StatsOptions {
        include_ips: is_truthy(query.include_ips.as_deref()),
        include_projects: is_truthy(query.include_projects.as_deref()),
    };

    let snapshot = state
        .counter
        .stats(
            query.d.as_deref().unwrap_or_default(),
            query.p.as_deref(),
            options,
        )
        .await?;

    Ok(Json(OkResponse::new(snapshot)).into_response())
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
