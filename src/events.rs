//! Inbound webhook payloads, decoded once into [`Event`].

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::WebhookError;

pub const MESSAGE_NORMAL: &str = "message.receive.normal";
pub const MESSAGE_INSTRUCTION: &str = "message.receive.instruction";
pub const BOT_FOLLOWED: &str = "bot.followed";
pub const BOT_UNFOLLOWED: &str = "bot.unfollowed";
pub const GROUP_JOIN: &str = "group.join";
pub const GROUP_LEAVE: &str = "group.leave";
pub const BUTTON_REPORT: &str = "button.report.inline";
pub const SHORTCUT_MENU: &str = "bot.shortcut.menu";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub sender_id: String,
    #[serde(default = "default_sender_type")]
    pub sender_type: String,
    #[serde(default)]
    pub sender_nickname: String,
}

fn default_sender_type() -> String {
    "user".to_string()
}

impl Sender {
    pub fn nickname(&self) -> &str {
        if self.sender_nickname.is_empty() {
            "unknown user"
        } else {
            &self.sender_nickname
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub chat_id: String,
    pub chat_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub send_time: i64,
    /// Number or string, depending on the client.
    #[serde(default)]
    pub command_id: Option<Value>,
    #[serde(default)]
    pub command_name: Option<String>,
}

impl Message {
    /// Text of a `text` or `markdown` message; `None` for anything else.
    pub fn text(&self) -> Option<&str> {
        match self.content_type.as_str() {
            "text" | "markdown" => Some(self.content.text.as_deref().unwrap_or_default()),
            _ => None,
        }
    }
}

/// Body of message-receive events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageEvent {
    pub sender: Sender,
    pub chat: Chat,
    pub message: Message,
}

/// Body of instruction events. Only the chat is needed to answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstructionEvent {
    #[serde(default)]
    pub sender: Option<Sender>,
    pub chat: Chat,
    #[serde(default)]
    pub message: Message,
}

/// Body of follow, unfollow and shortcut-menu events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SenderEvent {
    pub sender: Sender,
}

/// Body of group join and leave events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupEvent {
    pub sender: Sender,
    pub chat: Chat,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonClick {
    pub user_id: String,
    pub value: String,
    #[serde(default)]
    pub msg_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(MessageEvent),
    Instruction(InstructionEvent),
    Followed(SenderEvent),
    Unfollowed(Value),
    GroupJoined(GroupEvent),
    GroupLeft(Value),
    ButtonClicked(ButtonClick),
    ShortcutMenu(SenderEvent),
    Unrecognized(String),
}

impl Event {
    pub fn kind(&self) -> &str {
        match self {
            Event::Message(_) => MESSAGE_NORMAL,
            Event::Instruction(_) => MESSAGE_INSTRUCTION,
            Event::Followed(_) => BOT_FOLLOWED,
            Event::Unfollowed(_) => BOT_UNFOLLOWED,
            Event::GroupJoined(_) => GROUP_JOIN,
            Event::GroupLeft(_) => GROUP_LEAVE,
            Event::ButtonClicked(_) => BUTTON_REPORT,
            Event::ShortcutMenu(_) => SHORTCUT_MENU,
            Event::Unrecognized(kind) => kind,
        }
    }
}

/// Checked outer shape of a webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event_type: String,
    pub body: Value,
}

impl Envelope {
    /// Validate `{header:{eventType}, event}`. Button clicks may carry their
    /// fields at the top level instead of inside `event`.
    pub fn parse(raw: &[u8]) -> Result<Self, WebhookError> {
        let payload: Value = serde_json::from_slice(raw)
            .map_err(|e| WebhookError::Format(format!("body is not JSON: {}", e)))?;
        let Value::Object(mut root) = payload else {
            return Err(WebhookError::Format("body is not a JSON object".to_string()));
        };

        let event_type = root
            .get("header")
            .ok_or_else(|| WebhookError::Format("missing header".to_string()))?
            .get("eventType")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookError::Format("missing header.eventType".to_string()))?
            .to_string();

        let body = match root.remove("event") {
            Some(event) => event,
            None if event_type == BUTTON_REPORT
                && root.contains_key("value")
                && root.contains_key("userId") =>
            {
                Value::Object(root)
            }
            None => return Err(WebhookError::Format("missing event".to_string())),
        };

        Ok(Self { event_type, body })
    }

    pub fn into_event(self) -> Result<Event, WebhookError> {
        let Envelope { event_type, body } = self;
        let event = match event_type.as_str() {
            MESSAGE_NORMAL => Event::Message(decode(&event_type, body)?),
            MESSAGE_INSTRUCTION => Event::Instruction(decode(&event_type, body)?),
            BOT_FOLLOWED => Event::Followed(decode(&event_type, body)?),
            BOT_UNFOLLOWED => Event::Unfollowed(body),
            GROUP_JOIN => Event::GroupJoined(decode(&event_type, body)?),
            GROUP_LEAVE => Event::GroupLeft(body),
            BUTTON_REPORT => Event::ButtonClicked(decode(&event_type, body)?),
            SHORTCUT_MENU => Event::ShortcutMenu(decode(&event_type, body)?),
            _ => Event::Unrecognized(event_type),
        };
        Ok(event)
    }
}

fn decode<T: DeserializeOwned>(event_type: &str, body: Value) -> Result<T, WebhookError> {
    serde_json::from_value(body).map_err(|source| WebhookError::Payload {
        event_type: event_type.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<Event, WebhookError> {
        Envelope::parse(value.to_string().as_bytes())?.into_event()
    }

    #[test]
    fn test_decodes_text_message() {
        let event = parse(json!({
            "version": "1.0",
            "header": {"eventId": "e1", "eventType": "message.receive.normal", "eventTime": 1},
            "event": {
                "sender": {"senderId": "u1", "senderType": "user", "senderNickname": "alice"},
                "chat": {"chatId": "g1", "chatType": "group"},
                "message": {
                    "msgId": "m1",
                    "contentType": "text",
                    "content": {"text": "/help"},
                    "sendTime": 1700000000000i64
                }
            }
        }))
        .unwrap();

        let Event::Message(msg) = event else {
            panic!("expected message event");
        };
        assert_eq!(msg.sender.nickname(), "alice");
        assert_eq!(msg.chat.chat_id, "g1");
        assert_eq!(msg.message.text(), Some("/help"));
    }

    #[test]
    fn test_non_text_message_has_no_text() {
        let message: Message = serde_json::from_value(json!({
            "msgId": "m1",
            "contentType": "image",
            "content": {"imageUrl": "https://example.com/x.png"}
        }))
        .unwrap();
        assert_eq!(message.text(), None);

        let markdown: Message = serde_json::from_value(json!({
            "contentType": "markdown",
            "content": {"text": "**hi**"}
        }))
        .unwrap();
        assert_eq!(markdown.text(), Some("**hi**"));
    }

    #[test]
    fn test_missing_header_or_event_is_format_error() {
        let no_header = parse(json!({"event": {}}));
        assert!(matches!(no_header, Err(WebhookError::Format(_))));

        let no_event = parse(json!({"header": {"eventType": "bot.followed"}}));
        assert!(matches!(no_event, Err(WebhookError::Format(_))));

        let no_type = parse(json!({"header": {}, "event": {}}));
        assert!(matches!(no_type, Err(WebhookError::Format(_))));

        let not_json = Envelope::parse(b"not json");
        assert!(matches!(not_json, Err(WebhookError::Format(_))));

        let not_object = Envelope::parse(b"[1,2]");
        assert!(matches!(not_object, Err(WebhookError::Format(_))));
    }

    #[test]
    fn test_button_click_top_level_fields() {
        let event = parse(json!({
            "header": {"eventType": "button.report.inline"},
            "value": "confirm",
            "userId": "u7"
        }))
        .unwrap();
        assert_eq!(
            event,
            Event::ButtonClicked(ButtonClick {
                user_id: "u7".to_string(),
                value: "confirm".to_string(),
                msg_id: None,
            })
        );
    }

    #[test]
    fn test_button_click_inside_event() {
        let event = parse(json!({
            "header": {"eventType": "button.report.inline"},
            "event": {"value": "cancel", "userId": "u7", "msgId": "m3"}
        }))
        .unwrap();
        let Event::ButtonClicked(click) = event else {
            panic!("expected button click");
        };
        assert_eq!(click.value, "cancel");
        assert_eq!(click.msg_id.as_deref(), Some("m3"));
    }

    #[test]
    fn test_button_without_value_is_format_error() {
        let result = parse(json!({
            "header": {"eventType": "button.report.inline"},
            "userId": "u7"
        }));
        assert!(matches!(result, Err(WebhookError::Format(_))));
    }

    #[test]
    fn test_incomplete_body_is_payload_error() {
        let result = parse(json!({
            "header": {"eventType": "group.join"},
            "event": {"sender": {"senderId": "u1"}}
        }));
        assert!(matches!(result, Err(WebhookError::Payload { .. })));
    }

    #[test]
    fn test_unrecognized_event_type() {
        let event = parse(json!({
            "header": {"eventType": "bot.setting"},
            "event": {}
        }))
        .unwrap();
        assert_eq!(event, Event::Unrecognized("bot.setting".to_string()));
        assert_eq!(event.kind(), "bot.setting");
    }

    #[test]
    fn test_instruction_without_sender_and_string_command_id() {
        let event = parse(json!({
            "header": {"eventType": "message.receive.instruction"},
            "event": {
                "chat": {"chatId": "g1", "chatType": "group"},
                "message": {"commandId": "12", "commandName": "时间"}
            }
        }))
        .unwrap();

        let Event::Instruction(ev) = event else {
            panic!("expected instruction event");
        };
        assert!(ev.sender.is_none());
        assert_eq!(ev.message.command_id, Some(json!("12")));
        assert_eq!(ev.message.command_name.as_deref(), Some("时间"));
    }

    #[test]
    fn test_sender_defaults() {
        let sender: Sender = serde_json::from_value(json!({"senderId": "u1"})).unwrap();
        assert_eq!(sender.sender_type, "user");
        assert_eq!(sender.nickname(), "unknown user");
    }
}
