pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply codes shared by the messaging API and the webhook responses.
pub const CODE_OK: i64 = 1;
pub const CODE_DOWNSTREAM_FAILURE: i64 = 100;
pub const CODE_BAD_EVENT: i64 = 1002;

/// `{code, msg, data?}` as returned by the messaging API and by the webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn ok(msg: &str) -> Self {
        Self {
            code: CODE_OK,
            msg: msg.to_string(),
            data: None,
        }
    }

    /// Synthetic reply for transport or decoding failures.
    pub fn failure(err: &anyhow::Error) -> Self {
        Self {
            code: CODE_DOWNSTREAM_FAILURE,
            msg: format!("{:#}", err),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// `data.messageInfo.msgId` of a successful send.
    pub fn sent_msg_id(&self) -> Option<&str> {
        if !self.is_ok() {
            return None;
        }
        self.data
            .as_ref()?
            .get("messageInfo")?
            .get("msgId")?
            .as_str()
    }
}

/// Target of an outbound message: a user or a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: String,
    /// `user` or `group`
    pub kind: String,
}

impl Recipient {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, "user")
    }
}

/// Inline button attached to a text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    pub text: String,
    /// 1 = open url, 2 = copy, 3 = report value back to the bot
    pub action_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Optional filters for listing a chat's messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageQuery {
    pub chat_id: String,
    pub chat_type: String,
    pub message_id: Option<String>,
    pub before: u32,
    pub after: u32,
}

impl MessageQuery {
    /// Query pairs, leaving out empty or zero optional filters.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("chat-id", self.chat_id.clone()),
            ("chat-type", self.chat_type.clone()),
        ];
        if let Some(id) = self.message_id.as_deref().filter(|id| !id.is_empty()) {
            pairs.push(("message-id", id.to_string()));
        }
        if self.before > 0 {
            pairs.push(("before", self.before.to_string()));
        }
        if self.after > 0 {
            pairs.push(("after", self.after.to_string()));
        }
        pairs
    }
}

/// Outbound operations against the messaging platform.
///
/// Implementations never fail: transport and decoding errors come back as a
/// [`CODE_DOWNSTREAM_FAILURE`] response.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn send(&self, text: &str, to: &Recipient, buttons: Option<&[Button]>) -> ApiResponse;

    async fn send_stream(&self, text: &str, to: &Recipient) -> ApiResponse;

    async fn recall(&self, msg_id: &str, chat: &Recipient) -> ApiResponse;

    /// Replace the text of a sent message. Not used by any command yet.
    #[allow(dead_code)]
    async fn edit(&self, msg_id: &str, to: &Recipient, text: &str) -> ApiResponse;

    #[allow(dead_code)]
    async fn list_messages(&self, query: &MessageQuery) -> ApiResponse;
}
