use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// Nickname recorded for messages the bot sent itself.
pub const BOT_NICKNAME: &str = "Bot";

/// A text message remembered for a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub msg_id: String,
    pub sender_id: String,
    pub sender_nickname: String,
    pub content_type: String,
    pub text: String,
    /// Epoch milliseconds
    pub send_time: i64,
}

impl StoredMessage {
    /// `HH:MM nickname: text`, in local time.
    pub fn history_line(&self) -> String {
        let time = Local
            .timestamp_millis_opt(self.send_time)
            .single()
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string());
        format!("{} {}: {}", time, self.sender_nickname, self.text)
    }
}

/// Thread-safe per-chat message log with a sliding window per chat.
#[derive(Clone)]
pub struct HistoryStore {
    chats: Arc<Mutex<HashMap<String, VecDeque<StoredMessage>>>>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            chats: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Append a message, evicting the oldest entries past capacity.
    pub async fn push(&self, chat_id: &str, message: StoredMessage) {
        let mut chats = self.chats.lock().await;
        let history = chats.entry(chat_id.to_string()).or_default();
        history.push_back(message);
        while history.len() > self.capacity {
            if let Some(evicted) = history.pop_front() {
                debug!("Evicted message {} from chat {}", evicted.msg_id, chat_id);
            }
        }
    }

    /// The last `n` messages of a chat, oldest first.
    pub async fn recent(&self, chat_id: &str, n: usize) -> Vec<StoredMessage> {
        let chats = self.chats.lock().await;
        match chats.get(chat_id) {
            Some(history) => {
                let skip = history.len().saturating_sub(n);
                history.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    #[cfg(test)]
    pub async fn all(&self, chat_id: &str) -> Vec<StoredMessage> {
        self.recent(chat_id, self.capacity).await
    }

    /// Most recent message of a chat whose id differs from `exclude_msg_id`.
    pub async fn last_except(&self, chat_id: &str, exclude_msg_id: &str) -> Option<StoredMessage> {
        let chats = self.chats.lock().await;
        chats
            .get(chat_id)?
            .iter()
            .rev()
            .find(|m| m.msg_id != exclude_msg_id)
            .cloned()
    }

    /// Drop a message by id. Returns whether anything was removed.
    pub async fn remove(&self, chat_id: &str, msg_id: &str) -> bool {
        let mut chats = self.chats.lock().await;
        let Some(history) = chats.get_mut(chat_id) else {
            return false;
        };
        let before = history.len();
        history.retain(|m| m.msg_id != msg_id);
        before != history.len()
    }

    #[cfg(test)]
    pub async fn len(&self, chat_id: &str) -> usize {
        let chats = self.chats.lock().await;
        chats.get(chat_id).map_or(0, VecDeque::len)
    }
}
