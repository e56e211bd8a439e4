//! `/metrics` scrape endpoint

use axum::{
    Router,
    extract::{MatchedPath, Request},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::metrics::{self, HTTP_REQUESTS_TOTAL};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

async fn scrape() -> Response {
    match metrics::render() {
        Ok(text) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], text).into_response(),
        Err(error) => {
            tracing::error!(%error, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Count every request by method, route template and status.
///
/// Requests that match no route share the `unmatched` label.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), &endpoint, response.status().as_str()])
        .inc();

    response
}

/// Router for `/metrics`, independent of application state.
///
/// Meant for the internal network; restrict it at the reverse proxy.
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(scrape))
}
