use crate::chunker::{ChunkError, ChunkLimits};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Environment variable not set: ${0}")]
    MissingEnvVar(String),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid chunking config: {0}")]
    Chunking(#[from] ChunkError),
    #[error("Invalid delay window: delay_min_ms ({0}) > delay_max_ms ({1})")]
    DelayWindow(u64, u64),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub web: WebConfig,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Gemini model ID (e.g. "gemini-2.0-flash")
    #[serde(default = "default_model")]
    pub model: String,
    /// API key (supports ${ENV_VAR} expansion). Absent disables generation.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Path to persona file, relative to config dir
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            persona: None,
            base_url: default_gemini_base_url(),
        }
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ChannelsConfig {
    pub whatsapp: Option<WhatsAppConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WhatsAppConfig {
    /// WaSender API token. Absent disables sending.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Shared secret expected in the `X-Webhook-Signature` header.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_wasender_base_url")]
    pub base_url: String,
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_max_chars_per_line")]
    pub max_chars_per_line: usize,
    /// Pause window between consecutive chunk sends
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_chars_per_line: default_max_chars_per_line(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
        }
    }
}

impl ChunkingConfig {
    pub fn limits(&self) -> Result<ChunkLimits, ConfigError> {
        Ok(ChunkLimits::new(self.max_lines, self.max_chars_per_line)?)
    }

    pub fn delay_window(&self) -> Result<(Duration, Duration), ConfigError> {
        if self.delay_min_ms > self.delay_max_ms {
            return Err(ConfigError::DelayWindow(self.delay_min_ms, self.delay_max_ms));
        }
        Ok((
            Duration::from_millis(self.delay_min_ms),
            Duration::from_millis(self.delay_max_ms),
        ))
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_conversations_dir")]
    pub conversations_dir: String,
    /// Exchanges (user + model pairs) retained when history is loaded
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            conversations_dir: default_conversations_dir(),
            max_history: default_max_history(),
        }
    }
}

// ---------------------------------------------------------------------------
// Web
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_wasender_base_url() -> String {
    "https://www.wasenderapi.com".to_string()
}

fn default_max_lines() -> usize {
    3
}

fn default_max_chars_per_line() -> usize {
    100
}

fn default_delay_min_ms() -> u64 {
    550
}

fn default_delay_max_ms() -> u64 {
    1500
}

fn default_conversations_dir() -> String {
    "~/.wabridge/conversations".to_string()
}

fn default_max_history() -> usize {
    20
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Expand `~` to home directory in a path string.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${VAR_NAME}` patterns in a string using environment variables.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern");
    let mut result = input.to_string();
    let captures: Vec<(String, String)> = re
        .captures_iter(input)
        .map(|cap| (cap[0].to_string(), cap[1].to_string()))
        .collect();
    for (full_match, var_name) in captures {
        let value = std::env::var(&var_name)
            .map_err(|_| ConfigError::MissingEnvVar(var_name.clone()))?;
        result = result.replace(&full_match, &value);
    }
    Ok(result)
}

/// Default config directory: ~/.wabridge/
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wabridge")
}

/// Load config from `~/.wabridge/config.toml` (or a custom path).
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => config_dir().join("config.toml"),
    };

    if !config_path.exists() {
        return Err(ConfigError::NotFound(config_path));
    }

    let raw = std::fs::read_to_string(&config_path)?;
    parse_config(&raw)
}

/// Parse a config string (after reading from file) and validate it.
pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let expanded = expand_env_vars(raw)?;
    let config: Config = toml::from_str(&expanded)?;
    config.chunking.limits()?;
    config.chunking.delay_window()?;
    Ok(config)
}

impl Config {
    /// Resolve the persona file path.
    pub fn persona_path(&self) -> PathBuf {
        match &self.agent.persona {
            Some(p) => {
                let path = expand_tilde(p);
                if path.is_absolute() {
                    path
                } else {
                    config_dir().join(p)
                }
            }
            None => config_dir().join("persona.json"),
        }
    }

    /// Resolve the conversations directory.
    pub fn conversations_dir(&self) -> PathBuf {
        expand_tilde(&self.persistence.conversations_dir)
    }

    pub fn whatsapp(&self) -> Option<&WhatsAppConfig> {
        self.channels.whatsapp.as_ref()
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.whatsapp()
            .and_then(|w| w.webhook_secret.as_deref())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[agent]
api_key = "gm-test-key"

[channels.whatsapp]
api_token = "wa-token"
"#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.agent.model, "gemini-2.0-flash");
        assert_eq!(config.agent.api_key.as_deref(), Some("gm-test-key"));
        let wa = config.whatsapp().unwrap();
        assert_eq!(wa.api_token.as_deref(), Some("wa-token"));
        assert_eq!(wa.base_url, "https://www.wasenderapi.com");
        assert!(config.webhook_secret().is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[agent]
model = "gemini-1.5-pro"
api_key = "gm"
persona = "my-persona.json"
base_url = "http://localhost:9000"

[channels.whatsapp]
api_token = "wa"
webhook_secret = "s3cret"
base_url = "http://localhost:9001"

[chunking]
max_lines = 5
max_chars_per_line = 80
delay_min_ms = 0
delay_max_ms = 10

[persistence]
conversations_dir = "/tmp/conversations"
max_history = 4

[web]
bind = "127.0.0.1"
port = 8080
"#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.agent.model, "gemini-1.5-pro");
        assert_eq!(config.agent.base_url, "http://localhost:9000");
        assert_eq!(config.webhook_secret(), Some("s3cret"));

        let limits = config.chunking.limits().unwrap();
        assert_eq!(limits.max_lines(), 5);
        assert_eq!(limits.max_chars_per_line(), 80);
        let (min, max) = config.chunking.delay_window().unwrap();
        assert_eq!(min, Duration::ZERO);
        assert_eq!(max, Duration::from_millis(10));

        assert_eq!(config.conversations_dir(), PathBuf::from("/tmp/conversations"));
        assert_eq!(config.persistence.max_history, 4);
        assert_eq!(config.web.bind, "127.0.0.1");
        assert_eq!(config.web.port, 8080);
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("WABRIDGE_TEST_KEY", "expanded-value");
        let toml = r#"
[agent]
api_key = "${WABRIDGE_TEST_KEY}"
"#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.agent.api_key.as_deref(), Some("expanded-value"));
        std::env::remove_var("WABRIDGE_TEST_KEY");
    }

    #[test]
    fn test_missing_env_var() {
        let toml = r#"
[agent]
api_key = "${WABRIDGE_NONEXISTENT_VAR}"
"#;
        let err = parse_config(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "WABRIDGE_NONEXISTENT_VAR"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let err = parse_config("[chunking]\nmax_lines = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Chunking(_)));
    }

    #[test]
    fn test_inverted_delay_window_rejected() {
        let toml = "[chunking]\ndelay_min_ms = 2000\ndelay_max_ms = 100\n";
        let err = parse_config(toml).unwrap_err();
        assert!(matches!(err, ConfigError::DelayWindow(2000, 100)));
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/.wabridge/config.toml");
        assert!(path.to_str().unwrap().contains(".wabridge/config.toml"));
        assert!(!path.to_str().unwrap().starts_with("~"));

        let abs = expand_tilde("/absolute/path");
        assert_eq!(abs, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.agent.api_key.is_none());
        assert!(config.channels.whatsapp.is_none());
        assert_eq!(config.chunking.max_lines, 3);
        assert_eq!(config.chunking.max_chars_per_line, 100);
        assert_eq!(config.chunking.delay_min_ms, 550);
        assert_eq!(config.chunking.delay_max_ms, 1500);
        assert_eq!(config.persistence.conversations_dir, "~/.wabridge/conversations");
        assert_eq!(config.persistence.max_history, 20);
        assert_eq!(config.web.port, 5001);
        assert!(config.persona_path().ends_with("persona.json"));
    }
}
