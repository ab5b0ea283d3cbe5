//! webhook-bot setup helper.
//!
//! Asks a few questions on the terminal and writes `config.toml` to the
//! project root (`WEBHOOK_BOT_ROOT`, default `.`).

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;

const DEFAULT_API_BASE_URL: &str = "https://chat-go.jwzhd.com/open-apis/v1/bot";

struct ConfigParams<'a> {
    bot_token: &'a str,
    api_base_url: &'a str,
    port: u16,
    webhook_path: &'a str,
    history_capacity: usize,
}

/// Quoted and escaped TOML string literal.
fn toml_string(s: &str) -> String {
    toml::Value::String(s.to_owned()).to_string()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let bot_token = toml_string(p.bot_token);
    let api_base_url = toml_string(p.api_base_url);
    let port = p.port;
    let webhook_path = if p.webhook_path.starts_with('/') {
        toml_string(p.webhook_path)
    } else {
        toml_string(&format!("/{}", p.webhook_path))
    };
    let capacity = p.history_capacity;

    format!(
        r#"[server]
host = "0.0.0.0"
port = {port}
webhook_path = {webhook_path}

[platform]
bot_token = {bot_token}
api_base_url = {api_base_url}
# request_timeout_secs = 10

[history]
capacity = {capacity}

[stream]
chunk_chars = 5
chunk_delay_ms = 300
max_concurrent = 8
drain_timeout_secs = 10
"#
    )
}

fn main() -> Result<()> {
    let project_root =
        PathBuf::from(std::env::var("WEBHOOK_BOT_ROOT").unwrap_or_else(|_| ".".to_string()));

    println!("=== webhook-bot setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let bot_token = read_line("Bot token: ")?;
    if bot_token.is_empty() {
        anyhow::bail!("A bot token is required");
    }
    let api_base_url = or_default(
        read_line(&format!("API base URL [{DEFAULT_API_BASE_URL}]: "))?,
        DEFAULT_API_BASE_URL,
    );
    let port: u16 = or_default(read_line("Listen port [5000]: ")?, "5000")
        .parse()
        .context("Port must be a number between 0 and 65535")?;
    let webhook_path = or_default(read_line("Webhook path [/webhook]: ")?, "/webhook");
    let history_capacity: usize = or_default(read_line("History size per chat [50]: ")?, "50")
        .parse()
        .context("History size must be a positive number")?;

    let config = format_config(&ConfigParams {
        bot_token: &bot_token,
        api_base_url: &api_base_url,
        port,
        webhook_path: &webhook_path,
        history_capacity,
    });

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the bot with:  cargo run");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(bot_token: &str, port: u16, webhook_path: &str) -> String {
        format_config(&ConfigParams {
            bot_token,
            api_base_url: DEFAULT_API_BASE_URL,
            port,
            webhook_path,
            history_capacity: 50,
        })
    }

    #[test]
    fn test_platform_section_present() {
        let out = cfg("mytoken", 5000, "/webhook");
        assert!(out.contains("[platform]"));
        assert!(out.contains(r#"bot_token = "mytoken""#));
        assert!(out.contains(&format!(r#"api_base_url = "{DEFAULT_API_BASE_URL}""#)));
    }

    #[test]
    fn test_server_section_present() {
        let out = cfg("t", 8080, "/hook");
        assert!(out.contains("[server]"));
        assert!(out.contains("port = 8080"));
        assert!(out.contains(r#"webhook_path = "/hook""#));
    }

    #[test]
    fn test_webhook_path_gets_leading_slash() {
        let out = cfg("t", 5000, "events");
        assert!(out.contains(r#"webhook_path = "/events""#));
    }

    #[test]
    fn test_history_and_stream_sections() {
        let out = cfg("t", 5000, "/webhook");
        assert!(out.contains("[history]\ncapacity = 50"));
        assert!(out.contains("[stream]"));
        assert!(out.contains("chunk_chars = 5"));
        assert!(out.contains("chunk_delay_ms = 300"));
    }

    #[test]
    fn test_quotes_and_backslashes_are_escaped() {
        let out = cfg(r#"to"k\en"#, 5000, "/webhook");
        let parsed: toml::Value = toml::from_str(&out).unwrap();
        assert_eq!(parsed["platform"]["bot_token"].as_str(), Some(r#"to"k\en"#));
    }

    #[test]
    fn test_output_is_valid_toml() {
        let out = cfg("t", 5000, "/webhook");
        let parsed: toml::Value = toml::from_str(&out).unwrap();
        assert_eq!(parsed["platform"]["bot_token"].as_str(), Some("t"));
        assert_eq!(parsed["server"]["port"].as_integer(), Some(5000));
    }
}
