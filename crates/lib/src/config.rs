//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.chatbridge/config.json`) and environment.
//! The top-level keys (`ws_url`, `token`, `admin_qq`, `custom_prompt`) are the ones the
//! setup wizard writes; `executor` and `history` are optional tuning sections.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chat gateway WebSocket URL (e.g. "ws://127.0.0.1:3001"). Required to run the bot.
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Bearer token for the WebSocket handshake. Overridden by CHATBRIDGE_TOKEN env.
    #[serde(default)]
    pub token: Option<String>,

    /// QQ number of the bot administrator; their messages use the admin prompt.
    #[serde(default)]
    pub admin_qq: Option<i64>,

    /// Replaces the default chat-mode system prompt when set.
    #[serde(default)]
    pub custom_prompt: Option<String>,

    /// Seconds to wait between reconnect attempts (default 5).
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// External AI command settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Conversation history settings.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// How the external AI backend is invoked: `<command> <args...> <prompt>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Backend binary (default "iflow").
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments placed before the prompt (default ["-p"]).
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Deadline for one invocation, in seconds (default 60).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Concurrent slots in the async worker pool (default 10).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Working directory for the backend process. Some AI CLIs read project files from it.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Append failure diagnostics to this file when set.
    #[serde(default)]
    pub debug_log: Option<PathBuf>,
}

/// Flat-file conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Directory holding one `<key>.txt` per conversation. Defaults to `history` next to the
    /// config file.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Lines of history kept per conversation (default 5).
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_command() -> String {
    "iflow".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-p".to_string()]
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_workers() -> usize {
    10
}

fn default_max_lines() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: None,
            token: None,
            admin_qq: None,
            custom_prompt: None,
            reconnect_delay_secs: default_reconnect_delay_secs(),
            executor: ExecutorConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            timeout_secs: default_timeout_secs(),
            max_workers: default_max_workers(),
            work_dir: None,
            debug_log: None,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_lines: default_max_lines(),
        }
    }
}

impl Config {
    /// WebSocket URL with surrounding whitespace removed; None when unset or blank.
    pub fn ws_url(&self) -> Option<&str> {
        self.ws_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Resolve the gateway token: env CHATBRIDGE_TOKEN overrides config.
pub fn resolve_token(config: &Config) -> Option<String> {
    std::env::var("CHATBRIDGE_TOKEN")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .token
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CHATBRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".chatbridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Write config as pretty-printed JSON, creating the parent directory if needed.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(config).context("serializing config")?;
    std::fs::write(path, json).with_context(|| format!("writing config to {}", path.display()))?;
    Ok(())
}

/// Resolve the history directory: `history.directory` if set (relative paths resolved against
/// the config file's parent), otherwise the `history` subdirectory next to the config file.
pub fn resolve_history_dir(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.history.directory {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_parent.join(d)
            }
        }
        _ => config_parent.join("history"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(c.executor.command, "iflow");
        assert_eq!(c.executor.args, vec!["-p".to_string()]);
        assert_eq!(c.executor.timeout(), Duration::from_secs(60));
        assert_eq!(c.executor.max_workers, 10);
        assert_eq!(c.history.max_lines, 5);
    }

    #[test]
    fn wizard_shaped_file_parses_with_defaults() {
        let json = r#"{
            "ws_url": "ws://127.0.0.1:3001",
            "token": null,
            "admin_qq": 12345,
            "custom_prompt": "你是一只猫"
        }"#;
        let c: Config = serde_json::from_str(json).unwrap();
        assert_eq!(c.ws_url(), Some("ws://127.0.0.1:3001"));
        assert_eq!(c.admin_qq, Some(12345));
        assert_eq!(c.custom_prompt.as_deref(), Some("你是一只猫"));
        assert_eq!(c.executor.timeout_secs, 60);
    }

    #[test]
    fn blank_ws_url_is_unset() {
        let c = Config {
            ws_url: Some("   ".to_string()),
            ..Config::default()
        };
        assert_eq!(c.ws_url(), None);
    }

    #[test]
    fn resolve_token_ignores_blank() {
        if std::env::var("CHATBRIDGE_TOKEN").is_ok() {
            return;
        }
        let mut c = Config::default();
        c.token = Some("  secret ".to_string());
        assert_eq!(resolve_token(&c).as_deref(), Some("secret"));
        c.token = Some(" ".to_string());
        assert_eq!(resolve_token(&c), None);
    }

    #[test]
    fn resolve_history_dir_default() {
        let config = Config::default();
        let path = Path::new("/home/user/.chatbridge/config.json");
        assert_eq!(
            resolve_history_dir(&config, path),
            PathBuf::from("/home/user/.chatbridge/history")
        );
    }

    #[test]
    fn resolve_history_dir_override_relative() {
        let mut config = Config::default();
        config.history.directory = Some(PathBuf::from("chats"));
        let path = Path::new("/home/user/.chatbridge/config.json");
        assert_eq!(
            resolve_history_dir(&config, path),
            PathBuf::from("/home/user/.chatbridge/chats")
        );
    }

    #[test]
    fn save_then_load_keeps_fields() {
        let dir = std::env::temp_dir().join(format!("chatbridge-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let config = Config {
            ws_url: Some("ws://10.0.0.2:3001".to_string()),
            admin_qq: Some(42),
            ..Config::default()
        };
        save_config(&config, &path).unwrap();
        let (loaded, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(loaded.ws_url(), Some("ws://10.0.0.2:3001"));
        assert_eq!(loaded.admin_qq, Some(42));
        let _ = std::fs::remove_dir_all(dir);
    }
}
