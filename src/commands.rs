use chrono::Local;
use tracing::{debug, info, warn};

use crate::bot::AppState;
use crate::calc;
use crate::platform::{ApiResponse, Recipient};

/// Messages shown by `/history`.
const HISTORY_LINES: usize = 5;

pub const HELP_TEXT: &str = "🤖 Bot commands:\n\
     -----------------\n\
     /help - show this help\n\
     /time - show the current time\n\
     /calc [expression] - evaluate an arithmetic expression\n\
     /history - show recent chat history\n\
     /weather [city] - weather lookup (example)\n\
     /stream - try a streamed message\n\
     /recall - recall the previous message\n";

pub const STREAM_TEXT: &str = "This reply is arriving as a stream, a few characters at a time...";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Time,
    Calc(String),
    History,
    /// Listed in the help text as an example; answered as unknown.
    Weather(String),
    Stream,
    Recall,
    Unknown(String),
}

impl Command {
    /// Parse a message starting with `/`. Matching is case-insensitive.
    /// `/calc` also takes its expression without a separating space.
    pub fn parse(text: &str) -> Self {
        let normalized = text.trim().to_lowercase();
        if let Some(expr) = normalized.strip_prefix("/calc") {
            return Command::Calc(expr.trim().to_string());
        }
        let (name, arg) = match normalized.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (normalized.as_str(), ""),
        };

        match name {
            "/help" => Command::Help,
            "/time" => Command::Time,
            "/history" => Command::History,
            "/weather" => Command::Weather(arg.to_string()),
            "/stream" => Command::Stream,
            "/recall" => Command::Recall,
            _ => Command::Unknown(normalized.clone()),
        }
    }
}

/// Where a command came from.
pub struct CommandContext<'a> {
    pub chat: Recipient,
    /// Id of the message carrying the command.
    pub msg_id: &'a str,
    /// Lower-cased, trimmed command text.
    pub raw: String,
}

pub fn current_time_text() -> String {
    format!(
        "🕒 Current time: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// Run a command and return the webhook response for it.
pub async fn execute(state: &AppState, command: Command, ctx: &CommandContext<'_>) -> ApiResponse {
    info!("Command {:?} in chat {}", command, ctx.chat.id);

    match command {
        Command::Help => state.send_text(HELP_TEXT, &ctx.chat).await,
        Command::Time => state.send_text(&current_time_text(), &ctx.chat).await,
        Command::Calc(expr) => state.send_text(&calc_reply(&expr), &ctx.chat).await,
        Command::History => {
            let text = history_text(state, &ctx.chat.id).await;
            state.send_text(&text, &ctx.chat).await
        }
        Command::Stream => {
            state.spawn_stream(STREAM_TEXT, ctx.chat.clone()).await;
            ApiResponse::ok("processing")
        }
        Command::Recall => recall_last(state, ctx).await,
        Command::Weather(city) => {
            debug!("No weather provider configured for '{}'", city);
            state.send_text(&unknown_text(&ctx.raw), &ctx.chat).await
        }
        Command::Unknown(raw) => state.send_text(&unknown_text(&raw), &ctx.chat).await,
    }
}

fn unknown_text(raw: &str) -> String {
    format!(
        "❌ Unknown command: {}\nSend /help to see available commands",
        raw
    )
}

fn calc_reply(expr: &str) -> String {
    if expr.is_empty() {
        return "Please enter an expression, for example: /calc 3+5*2".to_string();
    }
    if !calc::is_safe(expr) {
        return "❌ The expression contains unsupported characters".to_string();
    }
    match calc::evaluate(expr) {
        Ok(value) => format!("🧮 Result: {} = {}", expr, calc::format_number(value)),
        Err(e) => format!("❌ Calculation failed: {}", e),
    }
}

async fn history_text(state: &AppState, chat_id: &str) -> String {
    let recent = state.history.recent(chat_id, HISTORY_LINES).await;
    if recent.is_empty() {
        return "📜 No chat history yet".to_string();
    }

    let mut text = String::from("📜 Recent messages:\n-----------------\n");
    for message in &recent {
        text.push_str(&message.history_line());
        text.push('\n');
    }
    text
}

async fn recall_last(state: &AppState, ctx: &CommandContext<'_>) -> ApiResponse {
    let Some(last) = state.history.last_except(&ctx.chat.id, ctx.msg_id).await else {
        return state.send_text("Nothing to recall", &ctx.chat).await;
    };

    let result = state.api.recall(&last.msg_id, &ctx.chat).await;
    if result.is_ok() {
        state.history.remove(&ctx.chat.id, &last.msg_id).await;
    } else {
        warn!(
            "Recall of {} in chat {} failed: {} {}",
            last.msg_id, ctx.chat.id, result.code, result.msg
        );
    }

    state
        .send_text("Recalled the previous message", &ctx.chat)
        .await
}
