use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::platform::{ApiResponse, CODE_BAD_EVENT};

/// Failures surfaced to the webhook caller.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The envelope itself is malformed.
    #[error("invalid event format: {0}")]
    Format(String),
    /// A known event type whose body lacks what its handler needs.
    #[error("malformed {event_type} payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Format(_) => StatusCode::BAD_REQUEST,
            WebhookError::Payload { .. } | WebhookError::Panic(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn body(&self) -> ApiResponse {
        let msg = match self {
            WebhookError::Format(_) => "invalid event format",
            WebhookError::Payload { .. } | WebhookError::Panic(_) => "server error",
        };
        ApiResponse {
            code: CODE_BAD_EVENT,
            msg: msg.to_string(),
            data: None,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match &self {
            WebhookError::Format(_) => warn!("Rejected webhook: {}", self),
            _ => error!("Error handling webhook: {}", self),
        }
        (self.status(), Json(self.body())).into_response()
    }
}
