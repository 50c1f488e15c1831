//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/qadash/config.toml)
//! 3. Environment variables (QADASH_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "QADASH";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local state (task cache, offline queue)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the task API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Budget for data calls (fetch/create/update/delete)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Budget for health probes
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// How often the scheduler probes reachability
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// How often the scheduler refreshes the cache while reachable
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Log file for `watch` mode (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_interval_secs: default_probe_interval_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (QADASH_DATA_DIR, QADASH_API_URL, ...)
    /// 2. Config file (~/.config/qadash/config.toml or QADASH_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
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

        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_url = val;
            }
        }

        override_secs("REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        override_secs("PROBE_TIMEOUT_SECS", &mut self.probe_timeout_secs);
        override_secs("PROBE_INTERVAL_SECS", &mut self.probe_interval_secs);
        override_secs("REFRESH_INTERVAL_SECS", &mut self.refresh_interval_secs);
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, config_path: &PathBuf) -> Result<()> {
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
    /// Can be overridden with QADASH_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qadash")
            .join("config.toml")
    }

    /// Get the path to the SQLite key-value store
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("qadash.db")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

/// Overwrite `target` with `QADASH_<suffix>` when it parses as seconds
fn override_secs(suffix: &str, target: &mut u64) {
    if let Ok(val) = std::env::var(format!("{}_{}", ENV_PREFIX, suffix)) {
        if let Ok(secs) = val.trim().parse() {
            *target = secs;
        }
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qadash")
}

fn default_api_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_refresh_interval_secs() -> u64 {
    30
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
        "QADASH_DATA_DIR",
        "QADASH_API_URL",
        "QADASH_REQUEST_TIMEOUT_SECS",
        "QADASH_PROBE_TIMEOUT_SECS",
        "QADASH_PROBE_INTERVAL_SECS",
        "QADASH_REFRESH_INTERVAL_SECS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://localhost:3000/api");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.probe_interval(), Duration::from_secs(10));
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert!(config.data_dir.ends_with("qadash"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.sqlite_path().ends_with("qadash.db"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("QADASH_DATA_DIR", "/tmp/qadash-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/qadash-test"));
    }

    #[test]
    fn test_env_override_api_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("QADASH_API_URL", "http://127.0.0.1:4000/api");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "http://127.0.0.1:4000/api");

        // Empty string keeps the current value
        env::set_var("QADASH_API_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "http://127.0.0.1:4000/api");
    }

    #[test]
    fn test_env_override_timings() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("QADASH_PROBE_INTERVAL_SECS", "5");
        env::set_var("QADASH_REQUEST_TIMEOUT_SECS", "not-a-number");
        config.apply_env_overrides();

        assert_eq!(config.probe_interval_secs, 5);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = Config {
            probe_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.probe_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/qadash"),
            api_url: "http://qa.local:3000/api".to_string(),
            probe_interval_secs: 15,
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("api_url"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.api_url, config.api_url);
        assert_eq!(parsed.probe_interval_secs, 15);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            api_url = "http://example.com/api"
            refresh_interval_secs = 60
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_url, "http://example.com/api");
        assert_eq!(config.refresh_interval_secs, 60);
        assert_eq!(config.probe_timeout_secs, 3);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("QADASH_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.api_url, "http://localhost:3000/api");
        assert!(config.data_dir.exists());
    }
}
