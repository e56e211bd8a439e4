//! ActivityPub endpoints
//!
//! - Personal inbox (activity receiving)

use axum::body::Bytes;
use axum::{
    Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::post,
};

use crate::AppState;
use crate::error::AppError;
use crate::metrics::FEDERATION_REQUEST_DURATION_SECONDS;

/// Create ActivityPub router
///
/// Routes:
/// - POST /ap/@:username/inbox - Personal inbox
pub fn activitypub_router() -> Router<AppState> {
    Router::new().route("/ap/:actor/inbox", post(inbox))
}

/// POST /ap/@:username/inbox
///
/// Receives activities from remote servers.
///
/// # Responses
/// - 200: handled, or a type this server does not act on
/// - 400: malformed JSON or invalid/stale timestamp
/// - 403: sender host is on the trust list
/// - 500: backend failure
async fn inbox(
    State(state): State<AppState>,
    Path(actor): Path<String>,
    body: Bytes,
) -> Response {
    // Path segment must look like "@username"
    let Some(username) = actor.strip_prefix('@').filter(|name| !name.is_empty()) else {
        return AppError::NotFound.into_response();
    };

    let _timer = FEDERATION_REQUEST_DURATION_SECONDS
        .with_label_values(&["inbox"])
        .start_timer();

    match state.inbox.dispatch(username, &body).await {
        Ok(ack) => ack.into_response(),
        Err(rejection) => {
            tracing::info!(
                recipient = %username,
                status = %rejection.status(),
                reason = %rejection,
                "Inbox delivery rejected"
            );
            rejection.into_response()
        }
    }
}
