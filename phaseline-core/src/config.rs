//! Configuration management
//!
//! One process-wide configuration, loaded and validated once at startup and
//! then handed to the runner and the transport adapter. Stored as
//! `settings.json` in the phaseline directory:
//! ```json
//! {
//!   "database": { "url": "postgres://..." },
//!   "apiKey": "...",
//!   "runner": { "failurePolicy": "leave-partial", "statementMode": "batch", "unitTimeoutSecs": 300 },
//!   "server": { "host": "127.0.0.1", "port": 8787, "allowedOrigin": "https://app.example.com" }
//! }
//! ```
//! Every field can be overridden from the environment (see [`Config::load`]).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

/// What happens to already applied units when a later unit of the same
/// phase fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Applied units stay applied; the phase stops at the failing unit
    #[default]
    LeavePartial,
    /// The phase runs inside one transaction and is rolled back on failure
    Transactional,
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leave-partial" | "leave_partial" => Ok(Self::LeavePartial),
            "transactional" => Ok(Self::Transactional),
            other => Err(Error::config(format!(
                "unknown failure policy '{}' (expected leave-partial or transactional)",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeavePartial => write!(f, "leave-partial"),
            Self::Transactional => write!(f, "transactional"),
        }
    }
}

/// How a unit's SQL is submitted to the database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatementMode {
    /// The whole unit in one round trip; failures carry no statement index
    #[default]
    Batch,
    /// One statement at a time; failures report the statement index
    PerStatement,
}

impl FromStr for StatementMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(Self::Batch),
            "per-statement" | "per_statement" => Ok(Self::PerStatement),
            other => Err(Error::config(format!(
                "unknown statement mode '{}' (expected batch or per-statement)",
                other
            ))),
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    database: DatabaseSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default)]
    runner: RunnerSettings,
    #[serde(default)]
    server: ServerSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunnerSettings {
    #[serde(default)]
    failure_policy: FailurePolicy,
    #[serde(default)]
    statement_mode: StatementMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_origin: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origin: None,
        }
    }
}

/// Runner behaviour handed to the phase runner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub failure_policy: FailurePolicy,
    pub statement_mode: StatementMode,
    pub unit_timeout: Option<Duration>,
}

/// Phaseline configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub database_url: Option<String>,
    pub api_key: Option<String>,
    pub run_options: RunOptions,
    pub server: ServerSettings,
    /// Default source directory for `embed`
    pub sql_dir: Option<PathBuf>,
    // Keep the raw settings for preservation when saving
    raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the phaseline directory, then apply environment
    /// overrides:
    ///
    /// - `PHASELINE_DATABASE_URL`, falling back to `DATABASE_URL`
    /// - `PHASELINE_API_KEY`
    /// - `PHASELINE_FAILURE_POLICY`, `PHASELINE_STATEMENT_MODE`,
    ///   `PHASELINE_UNIT_TIMEOUT_SECS`
    /// - `PHASELINE_ALLOWED_ORIGIN`
    /// - `PHASELINE_SQL_DIR`
    pub fn load(phaseline_dir: &Path) -> Result<Self> {
        Self::load_with_env(phaseline_dir, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injectable environment lookup
    pub fn load_with_env(
        phaseline_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let settings_path = phaseline_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("invalid {}: {}", settings_path.display(), e))
            })?
        } else {
            SettingsFile::default()
        };

        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let database_url = env("PHASELINE_DATABASE_URL")
            .or_else(|| env("DATABASE_URL"))
            .or_else(|| raw.database.url.clone());

        let failure_policy = match env("PHASELINE_FAILURE_POLICY") {
            Some(v) => v.parse()?,
            None => raw.runner.failure_policy,
        };

        let statement_mode = match env("PHASELINE_STATEMENT_MODE") {
            Some(v) => v.parse()?,
            None => raw.runner.statement_mode,
        };

        let unit_timeout_secs = match env("PHASELINE_UNIT_TIMEOUT_SECS") {
            Some(v) => Some(v.trim().parse::<u64>().map_err(|e| {
                Error::config(format!("PHASELINE_UNIT_TIMEOUT_SECS: {}", e))
            })?),
            None => raw.runner.unit_timeout_secs,
        };
        if unit_timeout_secs == Some(0) {
            return Err(Error::config("unit timeout must be at least one second"));
        }

        let mut server = raw.server.clone();
        if let Some(origin) = env("PHASELINE_ALLOWED_ORIGIN") {
            server.allowed_origin = Some(origin);
        }

        Ok(Self {
            database_url,
            api_key: env("PHASELINE_API_KEY").or_else(|| raw.api_key.clone()),
            run_options: RunOptions {
                failure_policy,
                statement_mode,
                unit_timeout: unit_timeout_secs.map(Duration::from_secs),
            },
            server,
            sql_dir: env("PHASELINE_SQL_DIR").map(PathBuf::from),
            raw_settings: raw,
        })
    }

    /// The connection string, or a configuration error when none is set
    pub fn database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            Error::config("no database URL: set PHASELINE_DATABASE_URL or database.url in settings.json")
        })
    }

    /// Save config to the phaseline directory.
    /// Preserves other settings that phaseline doesn't manage.
    pub fn save(&self, phaseline_dir: &Path) -> Result<()> {
        let settings_path = phaseline_dir.join("settings.json");

        let mut settings = self.raw_settings.clone();
        settings.database.url = self.database_url.clone();
        settings.api_key = self.api_key.clone();
        settings.runner.failure_policy = self.run_options.failure_policy;
        settings.runner.statement_mode = self.run_options.statement_mode;
        settings.runner.unit_timeout_secs = self.run_options.unit_timeout.map(|d| d.as_secs());
        settings.server = self.server.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_with_env(dir.path(), no_env).unwrap();

        assert!(config.database_url.is_none());
        assert_eq!(config.run_options.failure_policy, FailurePolicy::LeavePartial);
        assert_eq!(config.run_options.statement_mode, StatementMode::Batch);
        assert_eq!(config.server.port, 8787);
        assert!(matches!(config.database_url(), Err(Error::Config(_))));
    }

    #[test]
    fn test_settings_file_and_env_override() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{
                "database": { "url": "postgres://file/db" },
                "runner": { "failurePolicy": "transactional", "unitTimeoutSecs": 30 },
                "server": { "port": 9000 }
            }"#,
        )
        .unwrap();

        let config = Config::load_with_env(dir.path(), |key| match key {
            "DATABASE_URL" => Some("postgres://env/db".to_string()),
            "PHASELINE_STATEMENT_MODE" => Some("per-statement".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.database_url().unwrap(), "postgres://env/db");
        assert_eq!(config.run_options.failure_policy, FailurePolicy::Transactional);
        assert_eq!(config.run_options.statement_mode, StatementMode::PerStatement);
        assert_eq!(config.run_options.unit_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_phaseline_url_wins_over_database_url() {
        let dir = tempdir().unwrap();
        let config = Config::load_with_env(dir.path(), |key| match key {
            "PHASELINE_DATABASE_URL" => Some("postgres://primary".to_string()),
            "DATABASE_URL" => Some("postgres://fallback".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.database_url().unwrap(), "postgres://primary");
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let dir = tempdir().unwrap();
        let result = Config::load_with_env(dir.path(), |key| {
            (key == "PHASELINE_FAILURE_POLICY").then(|| "best-guess".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));

        let result = Config::load_with_env(dir.path(), |key| {
            (key == "PHASELINE_UNIT_TIMEOUT_SECS").then(|| "0".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_save_preserves_unmanaged_fields() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "dashboard": { "theme": "dark" } }"#,
        )
        .unwrap();

        let mut config = Config::load_with_env(dir.path(), no_env).unwrap();
        config.api_key = Some("secret".to_string());
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["dashboard"]["theme"], "dark");
        assert_eq!(saved["apiKey"], "secret");
    }
}
