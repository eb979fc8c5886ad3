//! Configuration for the job board server and CLI client.
//!
//! Settings are layered: `jobboard.toml` → environment → CLI flags. Every
//! field has a default, so a missing file is the same as an empty one.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! db_path = ".jobboard/jobs.db"
//! static_dir = "frontend/dist"
//! dev_mode = false
//!
//! [auth]
//! provider = "local"
//! cookie_name = "jobboard_session"
//! session_ttl_hours = 168
//! secure_cookies = false
//! post_login_redirect = "/dashboard"
//!
//! [logging]
//! filter = "info"
//! format = "pretty"
//!
//! [client]
//! server_url = "http://127.0.0.1:3141"
//! timeout_secs = 10
//! on_failure = "refetch"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::controller::FailurePolicy;

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".jobboard/jobboard.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Built frontend to serve; the API alone is served when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
    /// Permissive CORS for a local Vite dev server.
    pub dev_mode: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            db_path: PathBuf::from(".jobboard/jobs.db"),
            static_dir: None,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub provider: ProviderKind,
    pub cookie_name: String,
    pub session_ttl_hours: i64,
    pub secure_cookies: bool,
    pub post_login_redirect: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            cookie_name: "jobboard_session".to_string(),
            session_ttl_hours: 168,
            secure_cookies: false,
            post_login_redirect: "/dashboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub server_url: String,
    /// Per-request timeout; 0 disables it.
    pub timeout_secs: u64,
    pub on_failure: FailurePolicy,
    /// Session token; usually supplied through `JOBBOARD_TOKEN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3141".to_string(),
            timeout_secs: 10,
            on_failure: FailurePolicy::Refetch,
            token: None,
        }
    }
}

impl ClientSection {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// The complete jobboard.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobboardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub client: ClientSection,
}

impl JobboardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse jobboard.toml")
    }

    /// Load from `path`, returning defaults when the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the file, then apply process environment overrides.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `JOBBOARD_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("JOBBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("JOBBOARD_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid JOBBOARD_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("JOBBOARD_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("JOBBOARD_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("JOBBOARD_SERVER_URL") {
            self.client.server_url = url;
        }
        if let Some(token) = lookup("JOBBOARD_TOKEN") {
            self.client.token = Some(token);
        }
        if let Some(filter) = lookup("JOBBOARD_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize jobboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.server.port == 0 {
            warnings.push("server.port is 0: an ephemeral port will be chosen".to_string());
        }
        if self.auth.session_ttl_hours <= 0 {
            warnings.push(format!(
                "auth.session_ttl_hours is {}: sessions expire immediately",
                self.auth.session_ttl_hours
            ));
        }
        if self.client.timeout_secs == 0 {
            warnings.push(
                "client.timeout_secs is 0: a hung request leaves the board unreconciled"
                    .to_string(),
            );
        }
        if !self.auth.post_login_redirect.starts_with('/') {
            warnings.push(format!(
                "auth.post_login_redirect '{}' is not a local path",
                self.auth.post_login_redirect
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gives_defaults() {
        let config = JobboardConfig::parse("").unwrap();
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.server.db_path, PathBuf::from(".jobboard/jobs.db"));
        assert_eq!(config.auth.cookie_name, "jobboard_session");
        assert_eq!(config.client.on_failure, FailurePolicy::Refetch);
        assert_eq!(config.client.timeout(), Some(Duration::from_secs(10)));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn parses_partial_sections() {
        let config = JobboardConfig::parse(
            r#"
            [server]
            port = 8080
            static_dir = "frontend/dist"

            [logging]
            format = "json"

            [client]
            on_failure = "rollback"
            timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.static_dir, Some(PathBuf::from("frontend/dist")));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.client.on_failure, FailurePolicy::Rollback);
        assert_eq!(config.client.timeout(), None);
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn rejects_unknown_enum_values() {
        assert!(JobboardConfig::parse("[logging]\nformat = \"xml\"").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("JOBBOARD_PORT", "9000"),
            ("JOBBOARD_DB_PATH", "/tmp/jobs.db"),
            ("JOBBOARD_TOKEN", "abc"),
        ]
        .into_iter()
        .collect();
        let mut config = JobboardConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/jobs.db"));
        assert_eq!(config.client.token.as_deref(), Some("abc"));
    }

    #[test]
    fn env_rejects_bad_port() {
        let mut config = JobboardConfig::default();
        let err = config
            .apply_env(|k| (k == "JOBBOARD_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("JOBBOARD_PORT"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobboard.toml");
        let mut config = JobboardConfig::default();
        config.server.port = 4000;
        config.save(&path).unwrap();
        let loaded = JobboardConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.server.port, 4000);

        let missing = JobboardConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing.server.port, 3141);
    }
}
