//! Service configuration.
//!
//! Values are layered, later layers winning:
//! 1. built-in defaults
//! 2. `issueforge.toml` (optional)
//! 3. `.env` file, loaded into the process environment by `dotenvy`
//! 4. process environment
//! 5. command-line flags
//!
//! # Configuration File Format
//!
//! ```toml
//! port = 8080
//! host = "127.0.0.1"
//! dev_mode = false
//! frontend_url = "/"
//! log_format = "pretty"
//!
//! github_client_id = "Iv1.0123456789abcdef"
//! github_client_secret = "..."
//! github_redirect_uri = "http://localhost:8080/api/auth/callback"
//! github_scope = "repo read:org"
//! oauth_state_ttl_secs = 600
//! session_ttl_secs = 86400
//! max_sessions = 10000
//!
//! openai_model = "gpt-4o-mini"
//! openai_base_url = "https://api.openai.com/v1"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::generate::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};

pub const DEFAULT_CONFIG_FILE: &str = "issueforge.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_frontend_url() -> String {
    "/".to_string()
}

fn default_github_scope() -> String {
    "repo read:org".to_string()
}

fn default_state_ttl() -> u64 {
    600
}

fn default_session_ttl() -> u64 {
    24 * 60 * 60
}

fn default_max_sessions() -> usize {
    10_000
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Enables permissive CORS for a separately served frontend.
    #[serde(default)]
    pub dev_mode: bool,
    /// Where the browser lands after a successful login.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub github_client_id: Option<String>,
    #[serde(default)]
    pub github_client_secret: Option<String>,
    #[serde(default)]
    pub github_redirect_uri: Option<String>,
    #[serde(default = "default_github_scope")]
    pub github_scope: String,
    #[serde(default = "default_state_ttl")]
    pub oauth_state_ttl_secs: u64,
    /// Idle time after which a browser session is dropped.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Live sessions kept before the least recently used is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    /// Used when a request carries no key of its own.
    #[serde(default)]
    pub default_openai_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            dev_mode: false,
            frontend_url: default_frontend_url(),
            log_format: LogFormat::default(),
            github_client_id: None,
            github_client_secret: None,
            github_redirect_uri: None,
            github_scope: default_github_scope(),
            oauth_state_ttl_secs: default_state_ttl(),
            session_ttl_secs: default_session_ttl(),
            max_sessions: default_max_sessions(),
            openai_model: default_openai_model(),
            openai_base_url: default_openai_base_url(),
            default_openai_api_key: None,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("dev_mode", &self.dev_mode)
            .field("frontend_url", &self.frontend_url)
            .field("log_format", &self.log_format)
            .field("github_client_id", &self.github_client_id)
            .field("github_client_secret", &redact(&self.github_client_secret))
            .field("github_redirect_uri", &self.github_redirect_uri)
            .field("github_scope", &self.github_scope)
            .field("oauth_state_ttl_secs", &self.oauth_state_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("max_sessions", &self.max_sessions)
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("default_openai_api_key", &redact(&self.default_openai_api_key))
            .finish()
    }
}

/// Flags from the command line; `None` leaves the lower layer untouched.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub dev_mode: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse issueforge.toml")
    }

    /// Resolve the full configuration.
    ///
    /// An explicit `path` must exist; otherwise `issueforge.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        // A missing .env is normal.
        let _ = dotenvy::dotenv();

        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("ISSUEFORGE_PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid ISSUEFORGE_PORT '{}'", port))?;
        }
        if let Some(host) = get("ISSUEFORGE_HOST") {
            self.host = host;
        }
        if let Some(url) = get("ISSUEFORGE_FRONTEND_URL") {
            self.frontend_url = url;
        }
        if let Some(format) = get("ISSUEFORGE_LOG_FORMAT") {
            self.log_format = format.parse()?;
        }
        if let Some(id) = get("GITHUB_CLIENT_ID") {
            self.github_client_id = Some(id);
        }
        if let Some(secret) = get("GITHUB_CLIENT_SECRET") {
            self.github_client_secret = Some(secret);
        }
        if let Some(uri) = get("GITHUB_REDIRECT_URI") {
            self.github_redirect_uri = Some(uri);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.default_openai_api_key = Some(key);
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.openai_model = model;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if cli.dev_mode {
            self.dev_mode = true;
        }
    }

    /// True when both halves of the OAuth client are present.
    pub fn oauth_configured(&self) -> bool {
        matches!(
            (&self.github_client_id, &self.github_client_secret),
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty()
        )
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        match (&self.github_client_id, &self.github_client_secret) {
            (Some(_), None) => warnings.push(
                "GITHUB_CLIENT_ID is set but GITHUB_CLIENT_SECRET is missing; OAuth login disabled"
                    .to_string(),
            ),
            (None, Some(_)) => warnings.push(
                "GITHUB_CLIENT_SECRET is set but GITHUB_CLIENT_ID is missing; OAuth login disabled"
                    .to_string(),
            ),
            _ => {}
        }
        if self.oauth_state_ttl_secs == 0 {
            warnings.push("oauth_state_ttl_secs is 0; every login will fail".to_string());
        }
        if self.session_ttl_secs == 0 || self.max_sessions == 0 {
            warnings.push(
                "session_ttl_secs or max_sessions is 0; sessions will not survive between requests"
                    .to_string(),
            );
        }
        if !self.frontend_url.starts_with('/') && !self.frontend_url.starts_with("http") {
            warnings.push(format!(
                "frontend_url '{}' is neither a path nor an absolute URL",
                self.frontend_url
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.github_scope, "repo read:org");
        assert_eq!(config.oauth_state_ttl_secs, 600);
        assert_eq!(config.session_ttl_secs, 86_400);
        assert_eq!(config.max_sessions, 10_000);
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(!config.oauth_configured());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = AppConfig::parse(
            r#"
            port = 9000
            dev_mode = true
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.dev_mode);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let err = AppConfig::parse("prot = 1").unwrap_err();
        assert!(err.to_string().contains("issueforge.toml"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = AppConfig::parse("port = 9000\nopenai_model = \"gpt-4o\"").unwrap();
        config
            .apply_env(env(&[
                ("ISSUEFORGE_PORT", "9100"),
                ("GITHUB_CLIENT_ID", "Iv1.abc"),
                ("GITHUB_CLIENT_SECRET", "shh"),
                ("OPENAI_API_KEY", "sk-env"),
                ("OPENAI_MODEL", "  "),
            ]))
            .unwrap();
        assert_eq!(config.port, 9100);
        assert!(config.oauth_configured());
        assert_eq!(config.default_openai_api_key.as_deref(), Some("sk-env"));
        // Blank values are ignored.
        assert_eq!(config.openai_model, "gpt-4o");
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("ISSUEFORGE_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("ISSUEFORGE_PORT"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("ISSUEFORGE_PORT", "9100"), ("ISSUEFORGE_HOST", "0.0.0.0")]))
            .unwrap();
        config.apply_cli(&CliOverrides {
            port: Some(3000),
            host: None,
            dev_mode: true,
        });
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.dev_mode);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "frontend_url = \"http://localhost:3000\"").unwrap();
        let config = AppConfig::load_file(&path).unwrap();
        assert_eq!(config.frontend_url, "http://localhost:3000");
    }

    #[test]
    fn test_load_missing_explicit_file_errors() {
        let dir = tempdir().unwrap();
        let err = AppConfig::load_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_validate_half_configured_oauth() {
        let config = AppConfig {
            github_client_id: Some("Iv1.abc".into()),
            ..Default::default()
        };
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("GITHUB_CLIENT_SECRET"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AppConfig {
            github_client_secret: Some("topsecret".into()),
            default_openai_api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("topsecret"));
        assert!(!printed.contains("sk-secret"));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
