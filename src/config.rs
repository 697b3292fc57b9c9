//! Configuration loading.
//!
//! Loads from `./config.toml` (or `$REDLINE_CONFIG_PATH`). Environment
//! variables override file values; file values override defaults. The model
//! API key is never read from the file: it comes from `GEMINI_API_KEY`
//! (optionally via `.env`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedlineConfig {
    /// Sink and log file locations.
    pub paths: PathsConfig,
    /// Model backend settings.
    pub model: ModelConfig,
    /// Session defaults.
    pub session: SessionConfig,
}

/// Filesystem paths for sinks and logs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Structured audit sink (JSON lines, one record per turn).
    pub audit_log: String,
    /// Human-readable audit sink (labeled blocks).
    pub human_log: String,
    /// Directory for rotating application logs.
    pub logs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            audit_log: "redline_audit.jsonl".to_owned(),
            human_log: "redline_audit.log".to_owned(),
            logs_dir: "logs".to_owned(),
        }
    }
}

/// Model backend settings. The API key is environment-only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Gemini model identifier.
    pub model: String,
    /// Upper bound on one generate call, in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_owned(),
            request_timeout_seconds: 30,
        }
    }
}

/// Session defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Application context used when none is supplied on the command line.
    pub default_app: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_app: "general".to_owned(),
        }
    }
}

impl RedlineConfig {
    /// Load configuration with precedence env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file(|key| std::env::var(key).ok())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from the TOML file only, resolving the path via `env`.
    fn load_from_file(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = env("REDLINE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"));
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents).context("failed to parse config TOML")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests can inject values without
    /// mutating process environment.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("REDLINE_AUDIT_LOG") {
            self.paths.audit_log = v;
        }
        if let Some(v) = env("REDLINE_HUMAN_LOG") {
            self.paths.human_log = v;
        }
        if let Some(v) = env("REDLINE_LOGS_DIR") {
            self.paths.logs_dir = v;
        }
        if let Some(v) = env("REDLINE_MODEL") {
            self.model.model = v;
        }
        if let Some(v) = env("REDLINE_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.model.request_timeout_seconds = n,
                Err(_) => tracing::warn!(
                    var = "REDLINE_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("REDLINE_DEFAULT_APP") {
            self.session.default_app = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RedlineConfig::default();
        assert_eq!(config.paths.audit_log, "redline_audit.jsonl");
        assert_eq!(config.model.model, "gemini-2.0-flash");
        assert_eq!(config.model.request_timeout_seconds, 30);
        assert_eq!(config.session.default_app, "general");
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = RedlineConfig::default();
        config.apply_overrides(env_from(&[
            ("REDLINE_AUDIT_LOG", "/tmp/a.jsonl"),
            ("REDLINE_MODEL", "gemini-2.0-pro"),
            ("REDLINE_TIMEOUT_SECS", "5"),
            ("REDLINE_DEFAULT_APP", "claims_bot"),
        ]));
        assert_eq!(config.paths.audit_log, "/tmp/a.jsonl");
        assert_eq!(config.model.model, "gemini-2.0-pro");
        assert_eq!(config.model.request_timeout_seconds, 5);
        assert_eq!(config.session.default_app, "claims_bot");
    }

    #[test]
    fn test_invalid_timeout_override_is_ignored() {
        let mut config = RedlineConfig::default();
        config.apply_overrides(env_from(&[("REDLINE_TIMEOUT_SECS", "soon")]));
        assert_eq!(config.model.request_timeout_seconds, 30);
    }

    #[test]
    fn test_parse_toml() {
        let config: RedlineConfig = toml::from_str(
            r#"
            [paths]
            audit_log = "audit/structured.jsonl"

            [model]
            model = "gemini-2.5-flash"
            request_timeout_seconds = 10

            [session]
            default_app = "support_desk"
            "#,
        )
        .expect("valid TOML");
        assert_eq!(config.paths.audit_log, "audit/structured.jsonl");
        // Unset fields keep their defaults.
        assert_eq!(config.paths.human_log, "redline_audit.log");
        assert_eq!(config.model.model, "gemini-2.5-flash");
        assert_eq!(config.session.default_app, "support_desk");
    }
}
