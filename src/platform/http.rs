use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, TRANSFER_ENCODING};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use super::{ApiResponse, BotApi, Button, MessageQuery, Recipient};
use crate::config::{PlatformConfig, StreamConfig};

/// Split `text` into slices of at most `size` characters.
pub fn split_chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Messaging API client over HTTP. The bot token travels as `?token=`.
pub struct HttpBotApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
    chunk_chars: usize,
    chunk_delay: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    recv_id: &'a str,
    recv_type: &'a str,
    content_type: &'static str,
    content: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecallRequest<'a> {
    msg_id: &'a str,
    chat_id: &'a str,
    chat_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EditRequest<'a> {
    msg_id: &'a str,
    recv_id: &'a str,
    recv_type: &'a str,
    content_type: &'static str,
    content: serde_json::Value,
}

impl HttpBotApi {
    pub fn new(platform: &PlatformConfig, stream: &StreamConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = platform.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: platform.api_base_url.trim_end_matches('/').to_string(),
            token: platform.bot_token.clone(),
            chunk_chars: stream.chunk_chars,
            chunk_delay: stream.chunk_delay(),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    async fn post_json<T: Serialize + ?Sized>(&self, name: &str, body: &T) -> Result<ApiResponse> {
        let url = self.endpoint(name);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .query(&[("token", self.token.as_str())])
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", name))?;

        decode(response).await
    }

    async fn try_send_stream(&self, text: &str, to: &Recipient) -> Result<ApiResponse> {
        let url = self.endpoint("send-stream");
        let delay = self.chunk_delay;
        let chunks = split_chunks(text, self.chunk_chars);
        debug!("POST {} ({} chunks)", url, chunks.len());

        let body = futures::stream::iter(chunks.into_iter().enumerate()).then(
            move |(i, chunk)| async move {
                if i > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, std::io::Error>(chunk)
            },
        );

        let response = self
            .client
            .post(&url)
            .query(&[
                ("token", self.token.as_str()),
                ("recvId", to.id.as_str()),
                ("recvType", to.kind.as_str()),
                ("contentType", "text"),
            ])
            .header(CONTENT_TYPE, "text/plain")
            .header(TRANSFER_ENCODING, "chunked")
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .context("Failed to call send-stream")?;

        decode(response).await
    }

    async fn try_list_messages(&self, query: &MessageQuery) -> Result<ApiResponse> {
        let url = self.endpoint("messages");
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .query(&query.to_pairs())
            .send()
            .await
            .context("Failed to call messages")?;

        decode(response).await
    }
}

async fn decode(response: reqwest::Response) -> Result<ApiResponse> {
    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read response body")?;
    serde_json::from_str(&body)
        .with_context(|| format!("Unexpected response ({}): {}", status, body))
}

/// Fold an outbound failure into the uniform error reply.
fn settle(operation: &str, result: Result<ApiResponse>) -> ApiResponse {
    match result {
        Ok(resp) => resp,
        Err(e) => {
            error!("{} failed: {:#}", operation, e);
            ApiResponse::failure(&e)
        }
    }
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn send(&self, text: &str, to: &Recipient, buttons: Option<&[Button]>) -> ApiResponse {
        let mut content = json!({ "text": text });
        if let Some(buttons) = buttons.filter(|b| !b.is_empty()) {
            content["buttons"] = json!(buttons);
        }
        let request = SendRequest {
            recv_id: &to.id,
            recv_type: &to.kind,
            content_type: "text",
            content,
        };
        settle("Send", self.post_json("send", &request).await)
    }

    async fn send_stream(&self, text: &str, to: &Recipient) -> ApiResponse {
        settle("Stream send", self.try_send_stream(text, to).await)
    }

    async fn recall(&self, msg_id: &str, chat: &Recipient) -> ApiResponse {
        let request = RecallRequest {
            msg_id,
            chat_id: &chat.id,
            chat_type: &chat.kind,
        };
        settle("Recall", self.post_json("recall", &request).await)
    }

    async fn edit(&self, msg_id: &str, to: &Recipient, text: &str) -> ApiResponse {
        let request = EditRequest {
            msg_id,
            recv_id: &to.id,
            recv_type: &to.kind,
            content_type: "text",
            content: json!({ "text": text }),
        };
        settle("Edit", self.post_json("edit", &request).await)
    }

    async fn list_messages(&self, query: &MessageQuery) -> ApiResponse {
        settle("List messages", self.try_list_messages(query).await)
    }
}
