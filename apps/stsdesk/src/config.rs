//! # Configuration
//!
//! Optional TOML file plus environment overrides.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [storage]
//! uploads_dir = "/var/lib/stsdesk/uploads"
//!
//! [security]
//! cors_origins = ["https://ops.example.com"]
//! rate_limit = 50
//!
//! [[kinds]]
//! name = "bunker-survey"
//! form_prefix = "QAF-BNK"
//! required_fields = ["survey_date"]
//! date_field = "survey_date"
//! ```
//!
//! ## Environment Overrides
//!
//! - `STSDESK_API_KEY`: bearer key; authentication is off when unset
//! - `STSDESK_CORS_ORIGINS`: comma-separated origins, or `*`
//! - `STSDESK_RATE_LIMIT`: requests per second, `0` disables
//! - `STSDESK_UPLOADS_DIR`: attachment root

use serde::Deserialize;
use std::path::{Path, PathBuf};
use stsdesk_core::{KindRegistry, KindSpec, LedgerError};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "stsdesk.toml";

/// Default requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Ten MiB of attachment grows by a third in base64, plus the form itself.
pub const DEFAULT_BODY_LIMIT: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    /// Record kinds; the built-in set is used when empty.
    pub kinds: Vec<KindSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            body_limit_bytes: DEFAULT_BODY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// `None` allows localhost only; `["*"]` allows any origin.
    pub cors_origins: Option<Vec<String>>,
    pub rate_limit: u32,
    /// Only settable from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            api_key: None,
        }
    }
}

impl Config {
    /// Load `path`, or `stsdesk.toml` if present, then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, LedgerError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, LedgerError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::Io(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
            .map_err(|e| LedgerError::InvalidInput(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> Result<Self, LedgerError> {
        toml::from_str(raw).map_err(|e| LedgerError::InvalidInput(format!("invalid config: {}", e)))
    }

    /// Apply `STSDESK_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("STSDESK_API_KEY").filter(|k| !k.is_empty()) {
            self.security.api_key = Some(key);
        }
        if let Some(origins) = lookup("STSDESK_CORS_ORIGINS") {
            self.security.cors_origins = Some(
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }
        if let Some(limit) = lookup("STSDESK_RATE_LIMIT") {
            match limit.trim().parse() {
                Ok(rps) => self.security.rate_limit = rps,
                Err(_) => tracing::warn!(value = %limit, "Ignoring invalid STSDESK_RATE_LIMIT"),
            }
        }
        if let Some(dir) = lookup("STSDESK_UPLOADS_DIR").filter(|d| !d.is_empty()) {
            self.storage.uploads_dir = PathBuf::from(dir);
        }
    }

    /// Kind registry from `[[kinds]]`, or the built-in set.
    pub fn registry(&self) -> Result<KindRegistry, LedgerError> {
        if self.kinds.is_empty() {
            Ok(KindRegistry::default())
        } else {
            KindRegistry::new(self.kinds.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").expect("parse");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(config.registry().expect("registry").len(), 4);
    }

    #[test]
    fn custom_kinds_replace_builtins() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [[kinds]]
            name = "bunker-survey"
            form_prefix = "QAF-BNK"
            required_fields = ["survey_date"]
            date_field = "survey_date"
            "#,
        )
        .expect("parse");
        let registry = config.registry().expect("registry");
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("bunker-survey").is_ok());
        assert!(registry.resolve("sts-operation").is_err());
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[server]\nhots = \"x\"").is_err());
    }

    #[test]
    fn environment_overrides() {
        let env: BTreeMap<&str, &str> = [
            ("STSDESK_API_KEY", "s3cret"),
            ("STSDESK_CORS_ORIGINS", "https://a.example, https://b.example"),
            ("STSDESK_RATE_LIMIT", "0"),
            ("STSDESK_UPLOADS_DIR", "/srv/uploads"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.security.api_key.as_deref(), Some("s3cret"));
        assert_eq!(
            config.security.cors_origins,
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
        assert_eq!(config.security.rate_limit, 0);
        assert_eq!(config.storage.uploads_dir, PathBuf::from("/srv/uploads"));
    }

    #[test]
    fn invalid_rate_limit_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == "STSDESK_RATE_LIMIT").then(|| "fast".to_string()));
        assert_eq!(config.security.rate_limit, DEFAULT_RATE_LIMIT);
    }
}
