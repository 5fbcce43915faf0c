//! HTTP surface
//!
//! Exposes [`Service`] as `GET /` over axum.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;

use crate::service::{ApiRequest, Service};

/// Builds the router serving the endpoint
pub fn router(service: Service) -> Router {
    Router::new()
        .route("/", get(handle_get))
        .route("/healthz", get(healthz))
        .with_state(service)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn handle_get(
    State(service): State<Service>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let request = ApiRequest {
        params,
        authorization,
    };
    let response = service.handle(&request).await;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}
