//! Keyword fallback for text that is not a command.

const GREETINGS: &[&str] = &["hello", "hi", "hey", "你好", "嗨", "在吗"];
const THANKS: &[&str] = &["thank", "谢谢", "感谢"];

pub fn smart_reply(text: &str, nickname: &str) -> String {
    let text = text.to_lowercase();

    if GREETINGS.iter().any(|g| text.contains(g)) {
        return format!(
            "👋 Hello {}! I'm your assistant, what can I do for you?",
            nickname
        );
    }

    if THANKS.iter().any(|t| text.contains(t)) {
        return "You're welcome, glad I could help! 😊".to_string();
    }

    "Got your message! Send /help to see what I can do.".to_string()
}
