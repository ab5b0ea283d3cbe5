use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Client-wide timeout for outbound calls. Unset means no timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_api_base_url() -> String {
    "https://chat-go.jwzhd.com/open-apis/v1/bot".to_string()
}

fn default_history_capacity() -> usize {
    50
}

fn default_chunk_chars() -> usize {
    5
}

fn default_chunk_delay_ms() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    8
}

fn default_drain_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            chunk_delay_ms: default_chunk_delay_ms(),
            max_concurrent: default_max_concurrent(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl StreamConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// `PORT` and `BOT_TOKEN` take precedence over the file.
    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Some(token) = lookup("BOT_TOKEN") {
            if !token.trim().is_empty() {
                self.platform.bot_token = token.trim().to_string();
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.platform.bot_token.trim().is_empty() {
            anyhow::bail!("platform.bot_token is empty (set it in the config or via BOT_TOKEN)");
        }
        if self.history.capacity == 0 {
            anyhow::bail!("history.capacity must be at least 1");
        }
        if self.stream.chunk_chars == 0 {
            anyhow::bail!("stream.chunk_chars must be at least 1");
        }
        if self.stream.max_concurrent == 0 {
            anyhow::bail!("stream.max_concurrent must be at least 1");
        }
        if !self.server.webhook_path.starts_with('/') {
            anyhow::bail!(
                "server.webhook_path must start with '/': {}",
                self.server.webhook_path
            );
        }
        Ok(())
    }
}

#[cfg(test)]
impl Config {
    /// Minimal config pointing at `base_url`, with no stream delay.
    pub fn for_tests(base_url: &str) -> Self {
        let mut config = Self::parse(&format!(
            "[platform]\nbot_token = \"test-token\"\napi_base_url = \"{}\"\n",
            base_url
        ))
        .expect("test config parses");
        config.stream.chunk_delay_ms = 0;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = Config::parse("[platform]\nbot_token = \"abc\"\n").unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.webhook_path, "/webhook");
        assert_eq!(
            config.platform.api_base_url,
            "https://chat-go.jwzhd.com/open-apis/v1/bot"
        );
        assert_eq!(config.history.capacity, 50);
        assert_eq!(config.stream.chunk_chars, 5);
        assert_eq!(config.stream.chunk_delay(), Duration::from_millis(300));
        assert!(config.platform.request_timeout_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_port_and_token() {
        let mut config = Config::parse("[platform]\nbot_token = \"file-token\"\n").unwrap();
        let env: HashMap<&str, &str> = [("PORT", "8080"), ("BOT_TOKEN", "env-token")].into();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.platform.bot_token, "env-token");
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_port_env_is_an_error() {
        let mut config = Config::parse("[platform]\nbot_token = \"t\"\n").unwrap();
        let result = config.apply_env_overrides(|k| (k == "PORT").then(|| "abc".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_token_fails_validation() {
        let config = Config::parse("[platform]\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_fails_validation() {
        let config =
            Config::parse("[platform]\nbot_token = \"t\"\n[history]\ncapacity = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_platform_section_is_parse_error() {
        assert!(Config::parse("[server]\nport = 1\n").is_err());
    }
}
