// ABOUTME: Configuration loading and management for crew
// ABOUTME: Supports a TOML config file with sensible defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How worker processes are launched and driven
    pub worker: WorkerConfig,
    /// Logging settings
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Program launched for each worker (defaults to "claude")
    pub binary: String,
    /// Arguments placed before the generated flags
    pub extra_args: Vec<String>,
    /// Flag that carries the worker's system prompt
    pub system_prompt_flag: String,
    /// Pass --dangerously-skip-permissions so workers never block on approval prompts
    pub skip_permissions: bool,
    /// Bytes written to a worker's stdin to interrupt its current turn
    pub interrupt_sequence: String,
    /// Delay between an interrupt and its follow-up message
    pub interrupt_delay_ms: u64,
    /// How long to wait for buffered output after a worker exits
    pub drain_timeout_ms: u64,
    /// Extra environment variables for every worker
    pub env: BTreeMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            extra_args: Vec::new(),
            system_prompt_flag: "--system-prompt".to_string(),
            skip_permissions: true,
            interrupt_sequence: "\u{3}\n".to_string(),
            interrupt_delay_ms: 100,
            drain_timeout_ms: 1000,
            env: BTreeMap::new(),
        }
    }
}

impl WorkerConfig {
    pub fn interrupt_delay(&self) -> Duration {
        Duration::from_millis(self.interrupt_delay_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log to ~/.config/crew/<app>/<app>.log instead of stderr
    pub file: bool,
}

impl Config {
    /// Get the XDG config directory for crew (~/.config/crew)
    pub fn config_dir() -> PathBuf {
        // Respect XDG_CONFIG_HOME if set, otherwise use ~/.config
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|p| p.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("crew")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load config from XDG config directory
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            // No config found, use defaults
            Ok(Self::default())
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    /// Generate a default config file content
    pub fn default_toml() -> String {
        r#"# crew configuration
# Location: ~/.config/crew/config.toml

[worker]
binary = "claude"
# extra_args = ["--model", "sonnet"]
system_prompt_flag = "--system-prompt"
skip_permissions = true
interrupt_sequence = "\u0003\n"
interrupt_delay_ms = 100
drain_timeout_ms = 1000

[worker.env]
# ANTHROPIC_BASE_URL = "http://localhost:4000"

[log]
file = false
"#
        .to_string()
    }

    /// Initialize config directory and create default config if needed
    pub fn init() -> Result<PathBuf> {
        Self::init_at(&Self::config_path())
    }

    /// Write the default config to `path` unless a file is already there
    pub fn init_at(path: &Path) -> Result<PathBuf> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        }

        if !path.exists() {
            std::fs::write(path, Self::default_toml())
                .with_context(|| format!("Failed to write config: {}", path.display()))?;
        }

        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.worker.binary, "claude");
        assert_eq!(config.worker.system_prompt_flag, "--system-prompt");
        assert!(config.worker.skip_permissions);
        assert_eq!(config.worker.interrupt_sequence, "\u{3}\n");
        assert_eq!(config.worker.interrupt_delay(), Duration::from_millis(100));
        assert!(!config.log.file);
    }

    #[test]
    fn test_default_toml_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::default_toml()).unwrap();
        let defaults = WorkerConfig::default();
        assert_eq!(config.worker.binary, defaults.binary);
        assert_eq!(config.worker.interrupt_sequence, defaults.interrupt_sequence);
        assert_eq!(config.worker.interrupt_delay_ms, defaults.interrupt_delay_ms);
        assert_eq!(config.worker.drain_timeout_ms, defaults.drain_timeout_ms);
        assert!(config.worker.env.is_empty());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[worker]
binary = "/opt/bin/claude"
interrupt_delay_ms = 250

[worker.env]
FOO = "bar"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.worker.binary, "/opt/bin/claude");
        assert_eq!(config.worker.interrupt_delay_ms, 250);
        assert_eq!(config.worker.system_prompt_flag, "--system-prompt");
        assert_eq!(config.worker.env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn test_load_from_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[worker\nbinary = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::load_from(dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_init_at_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::init_at(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), Config::default_toml());

        std::fs::write(&path, "[worker]\nbinary = \"custom\"\n").unwrap();
        Config::init_at(&path).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.worker.binary, "custom");
    }
}
