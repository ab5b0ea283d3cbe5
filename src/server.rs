use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::bot::{self, AppState};
use crate::config::Config;

pub fn router(state: Arc<AppState>, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn webhook(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    async move {
        info!("Received event: {}", String::from_utf8_lossy(&body));
        match bot::handle_webhook(&state, &body).await {
            Ok(reply) => Json(reply).into_response(),
            Err(e) => e.into_response(),
        }
    }
    .instrument(info_span!("webhook", %request_id))
    .await
}

/// Serve until Ctrl-C or SIGTERM, then drain in-flight stream tasks.
pub async fn serve(state: Arc<AppState>, config: &Config) -> Result<()> {
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!(
        "Webhook listening on http://{}{}",
        addr, config.server.webhook_path
    );

    let app = router(Arc::clone(&state), &config.server.webhook_path);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped, waiting for stream tasks");
    state.streams.drain(config.stream.drain_timeout()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::tests::{message_payload, state_with, FakeApi};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post_webhook(api: Arc<FakeApi>, body: impl Into<Body>) -> (StatusCode, Value) {
        let app = router(Arc::new(state_with(api)), "/webhook");
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_missing_header_is_400() {
        let (status, body) = post_webhook(
            Arc::new(FakeApi::default()),
            json!({"event": {}}).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"code": 1002, "msg": "invalid event format"}));
    }

    #[tokio::test]
    async fn test_missing_event_is_400() {
        let (status, body) = post_webhook(
            Arc::new(FakeApi::default()),
            json!({"header": {"eventType": "message.receive.normal"}}).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 1002);
    }

    #[tokio::test]
    async fn test_invalid_json_is_400() {
        let (status, body) = post_webhook(Arc::new(FakeApi::default()), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 1002);
    }

    #[tokio::test]
    async fn test_incomplete_event_body_is_500() {
        let (status, body) = post_webhook(
            Arc::new(FakeApi::default()),
            json!({"header": {"eventType": "message.receive.normal"}, "event": {"chat": {}}})
                .to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"code": 1002, "msg": "server error"}));
    }

    #[tokio::test]
    async fn test_command_reply_is_returned() {
        let api = Arc::new(FakeApi::default());
        let (status, body) = post_webhook(
            api.clone(),
            message_payload("m1", "text", "/calc 3+5*2").to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 1);
        assert_eq!(body["data"]["messageInfo"]["msgId"], "bot-0");
        assert_eq!(api.sent_texts(), vec!["🧮 Result: 3+5*2 = 13".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_returns_processing() {
        let (status, body) = post_webhook(
            Arc::new(FakeApi::default()),
            message_payload("m1", "text", "/stream").to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"code": 1, "msg": "processing"}));
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(Arc::new(state_with(Arc::new(FakeApi::default()))), "/webhook");
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }
}
