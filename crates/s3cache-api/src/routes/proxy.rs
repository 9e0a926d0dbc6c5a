//! Read-through proxy routes

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::Response,
    routing::get,
};
use futures::StreamExt;
use s3cache_core::{ProxyResponse, ResponseBody};
use std::convert::Infallible;
use tracing::debug;

use crate::state::AppState;

/// GET /
async fn root(State(state): State<AppState>) -> Response {
    respond(state.service.handle("/").await)
}

/// GET /{bucket}/{key}
async fn proxy(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let path = format!("/{}", path);
    debug!("GET {}", path);

    respond(state.service.handle(&path).await)
}

fn respond(outcome: ProxyResponse) -> Response {
    metrics::counter!("s3cache_requests_total", "status" => outcome.status.as_u16().to_string())
        .increment(1);

    let body = match outcome.body {
        ResponseBody::Full(data) => Body::from(data),
        ResponseBody::Stream(stream) => Body::from_stream(stream.map(Ok::<_, Infallible>)),
    };

    let mut response = Response::new(body);
    *response.status_mut() = outcome.status;
    if let Some(content_type) = outcome.content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

/// Create proxy routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/{*path}", get(proxy))
}
