//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/xword/config.toml)
//! 3. Environment variables (XWORD_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "XWORD";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for snapshots and the user id file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Game server WebSocket URL (optional)
    #[serde(default)]
    pub server_url: Option<String>,

    /// Play from local snapshots only
    #[serde(default)]
    pub offline: bool,

    /// Name announced to other players
    #[serde(default)]
    pub display_name: Option<String>,

    /// HSL color announced to other players
    #[serde(default)]
    pub color: Option<String>,

    /// Observe games without announcing ourselves until an explicit join
    #[serde(default)]
    pub defer_join: bool,

    /// How long a fire-and-forget emit waits for its acknowledgement
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// How long to wait for the full event log on (re)connect
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    #[serde(default = "default_initial_reconnect_delay_ms")]
    pub initial_reconnect_delay_ms: u64,

    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server_url: None,
            offline: false,
            display_name: None,
            color: None,
            defer_join: false,
            ack_timeout_ms: default_ack_timeout_ms(),
            sync_timeout_ms: default_sync_timeout_ms(),
            initial_reconnect_delay_ms: default_initial_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (XWORD_DATA_DIR, XWORD_SERVER_URL, XWORD_OFFLINE, ...)
    /// 2. Config file (~/.config/xword/config.toml or XWORD_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from an explicit path when given, otherwise the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            self.server_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_OFFLINE", ENV_PREFIX)) {
            self.offline = parse_flag(&val);
        }

        if let Ok(val) = std::env::var(format!("{}_DISPLAY_NAME", ENV_PREFIX)) {
            self.display_name = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_DEFER_JOIN", ENV_PREFIX)) {
            self.defer_join = parse_flag(&val);
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with XWORD_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xword")
            .join("config.toml")
    }

    /// Path of the file holding this install's user id
    pub fn user_id_path(&self) -> PathBuf {
        self.data_dir.join("user_id")
    }

    /// Whether sessions should run without a server
    pub fn is_offline(&self) -> bool {
        self.offline || self.server_url.is_none()
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn initial_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.initial_reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("xword")
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

fn default_sync_timeout_ms() -> u64 {
    10_000
}

fn default_initial_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "XWORD_DATA_DIR",
        "XWORD_SERVER_URL",
        "XWORD_OFFLINE",
        "XWORD_DISPLAY_NAME",
        "XWORD_DEFER_JOIN",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.offline);
        assert!(config.server_url.is_none());
        assert!(config.is_offline());
        assert!(config.data_dir.ends_with("xword"));
        assert_eq!(config.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.initial_reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.max_reconnect_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.user_id_path().ends_with("user_id"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("XWORD_DATA_DIR", "/tmp/xword-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/xword-test"));
    }

    #[test]
    fn test_env_override_flags() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("XWORD_OFFLINE", "true");
        env::set_var("XWORD_DEFER_JOIN", "1");
        config.apply_env_overrides();
        assert!(config.offline);
        assert!(config.defer_join);

        env::set_var("XWORD_OFFLINE", "false");
        config.apply_env_overrides();
        assert!(!config.offline);
    }

    #[test]
    fn test_env_override_server_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("XWORD_SERVER_URL", "ws://localhost:3021");
        config.apply_env_overrides();
        assert_eq!(config.server_url, Some("ws://localhost:3021".to_string()));
        assert!(!config.is_offline());

        // Empty string clears it
        env::set_var("XWORD_SERVER_URL", "");
        config.apply_env_overrides();
        assert!(config.server_url.is_none());
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/xword"),
            server_url: Some("ws://games.example.com".to_string()),
            display_name: Some("Ada".to_string()),
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("server_url"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.server_url, config.server_url);
        assert_eq!(parsed.display_name, config.display_name);
        assert_eq!(parsed.ack_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            server_url = "ws://example.com"
            defer_join = true
            ack_timeout_ms = 250
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.server_url, Some("ws://example.com".to_string()));
        assert!(config.defer_join);
        assert_eq!(config.ack_timeout(), Duration::from_millis(250));
        assert_eq!(config.sync_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp = tempfile::TempDir::new().unwrap();
        env::set_var("XWORD_DATA_DIR", temp.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(!config.offline);
        assert!(config.server_url.is_none());
        assert!(config.data_dir.exists());
    }
}
