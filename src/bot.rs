use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::commands::{self, Command, CommandContext};
use crate::config::Config;
use crate::error::WebhookError;
use crate::events::{
    ButtonClick, Envelope, Event, GroupEvent, InstructionEvent, MessageEvent, SenderEvent,
};
use crate::memory::{HistoryStore, StoredMessage, BOT_NICKNAME};
use crate::platform::{ApiResponse, BotApi, Button, Recipient};
use crate::reply;
use crate::streams::StreamTasks;

const WELCOME_TEXT: &str = "🎉 Thanks for following! I'm your assistant.\n\
     Send /help to see what I can do.\n\
     How can I help?";

const SHORTCUT_HELP_TEXT: &str = "📱 Shortcut menu:\n\
     ----------------\n\
     1. Current time - /time\n\
     2. Calculator - /calc\n\
     3. Help - /help";

/// Shared application state
pub struct AppState {
    pub api: Arc<dyn BotApi>,
    pub history: HistoryStore,
    pub streams: StreamTasks,
}

impl AppState {
    pub fn new(api: Arc<dyn BotApi>, config: &Config) -> Self {
        Self {
            api,
            history: HistoryStore::new(config.history.capacity),
            streams: StreamTasks::new(config.stream.max_concurrent),
        }
    }

    pub async fn send_text(&self, text: &str, to: &Recipient) -> ApiResponse {
        self.send(text, to, None).await
    }

    /// Send a message and remember it in the recipient's history on success.
    pub async fn send(&self, text: &str, to: &Recipient, buttons: Option<&[Button]>) -> ApiResponse {
        let response = self.api.send(text, to, buttons).await;
        if let Some(msg_id) = response.sent_msg_id() {
            self.history
                .push(
                    &to.id,
                    StoredMessage {
                        msg_id: msg_id.to_string(),
                        sender_id: "bot".to_string(),
                        sender_nickname: BOT_NICKNAME.to_string(),
                        content_type: "text".to_string(),
                        text: text.to_string(),
                        send_time: Utc::now().timestamp_millis(),
                    },
                )
                .await;
        } else if !response.is_ok() {
            warn!(
                "Send to {} {} failed: {} {}",
                to.kind, to.id, response.code, response.msg
            );
        }
        response
    }

    /// Stream `text` to `to` in the background.
    pub async fn spawn_stream(&self, text: &str, to: Recipient) {
        let api = Arc::clone(&self.api);
        let text = text.to_string();
        let name = format!("stream:{}", to.id);
        self.streams
            .spawn(&name, async move {
                let response = api.send_stream(&text, &to).await;
                if response.is_ok() {
                    info!("Streamed message to {} {}", to.kind, to.id);
                } else {
                    warn!(
                        "Stream to {} {} failed: {} {}",
                        to.kind, to.id, response.code, response.msg
                    );
                }
            })
            .await;
        debug!("{} stream task(s) in flight", self.streams.in_flight().await);
    }
}

/// Validate, decode and dispatch one webhook payload.
pub async fn handle_webhook(state: &AppState, raw: &[u8]) -> Result<ApiResponse, WebhookError> {
    let event = Envelope::parse(raw)?.into_event()?;
    debug!("Dispatching {} event", event.kind());

    AssertUnwindSafe(dispatch(state, event))
        .catch_unwind()
        .await
        .map_err(|panic| WebhookError::Panic(panic_message(panic.as_ref())))
}

async fn dispatch(state: &AppState, event: Event) -> ApiResponse {
    match event {
        Event::Message(ev) => on_message(state, ev).await,
        Event::Instruction(ev) => on_instruction(state, ev).await,
        Event::Followed(ev) => on_followed(state, ev).await,
        Event::Unfollowed(body) => {
            info!("User unfollowed: {}", body);
            ApiResponse::ok("success")
        }
        Event::GroupJoined(ev) => on_group_joined(state, ev).await,
        Event::GroupLeft(body) => {
            info!("User left group: {}", body);
            ApiResponse::ok("success")
        }
        Event::ButtonClicked(click) => on_button_clicked(state, click).await,
        Event::ShortcutMenu(ev) => on_shortcut_menu(state, ev).await,
        Event::Unrecognized(kind) => {
            warn!("Unknown event type: {}", kind);
            ApiResponse::ok("unknown event")
        }
    }
}

async fn on_message(state: &AppState, ev: MessageEvent) -> ApiResponse {
    let MessageEvent {
        sender,
        chat,
        message,
    } = ev;

    let Some(text) = message.text() else {
        debug!(
            "Ignoring {} message {} in chat {}",
            message.content_type, message.msg_id, chat.chat_id
        );
        return ApiResponse::ok("ignored");
    };
    let text = text.to_string();

    let send_time = if message.send_time > 0 {
        message.send_time
    } else {
        Utc::now().timestamp_millis()
    };
    state
        .history
        .push(
            &chat.chat_id,
            StoredMessage {
                msg_id: message.msg_id.clone(),
                sender_id: sender.sender_id.clone(),
                sender_nickname: sender.nickname().to_string(),
                content_type: message.content_type.clone(),
                text: text.clone(),
                send_time,
            },
        )
        .await;

    let to = Recipient::new(chat.chat_id, chat.chat_type);

    if text.starts_with('/') {
        let ctx = CommandContext {
            chat: to,
            msg_id: &message.msg_id,
            raw: text.trim().to_lowercase(),
        };
        return commands::execute(state, Command::parse(&text), &ctx).await;
    }

    let reply = reply::smart_reply(&text, sender.nickname());
    state.send_text(&reply, &to).await
}

async fn on_instruction(state: &AppState, ev: InstructionEvent) -> ApiResponse {
    let name = ev.message.command_name.as_deref().unwrap_or_default();
    info!(
        "Instruction {:?} ({}) from {}",
        ev.message.command_id,
        name,
        ev.sender.as_ref().map_or("unknown", |s| s.sender_id.as_str())
    );

    match name.trim().to_lowercase().as_str() {
        "time" | "时间" => {
            let to = Recipient::new(&ev.chat.chat_id, &ev.chat.chat_type);
            state.send_text(&commands::current_time_text(), &to).await
        }
        _ => ApiResponse::ok("success"),
    }
}

async fn on_followed(state: &AppState, ev: SenderEvent) -> ApiResponse {
    let to = Recipient::new(ev.sender.sender_id, ev.sender.sender_type);
    state.send_text(WELCOME_TEXT, &to).await
}

async fn on_group_joined(state: &AppState, ev: GroupEvent) -> ApiResponse {
    let text = format!(
        "👋 Welcome {} to the group!\n\
         I'm this group's assistant, send /help to see what I can do",
        ev.sender.nickname()
    );
    let to = Recipient::new(ev.chat.chat_id, ev.chat.chat_type);
    state.send_text(&text, &to).await
}

async fn on_button_clicked(state: &AppState, click: ButtonClick) -> ApiResponse {
    let to = Recipient::user(&click.user_id);
    match click.value.as_str() {
        "confirm" => state.send_text("✅ Operation confirmed!", &to).await,
        "cancel" => state.send_text("❌ Operation cancelled", &to).await,
        other => {
            debug!(
                "Button value {} from {} on {:?} needs no reply",
                other, click.user_id, click.msg_id
            );
            ApiResponse::ok("success")
        }
    }
}

async fn on_shortcut_menu(state: &AppState, ev: SenderEvent) -> ApiResponse {
    let to = Recipient::new(ev.sender.sender_id, ev.sender.sender_type);
    state.send_text(SHORTCUT_HELP_TEXT, &to).await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
