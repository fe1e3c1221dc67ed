//! TOML config file loading, environment overrides, and validation for the
//! ingest service.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Upper bound for the startup store connection attempt.
const MAX_CONNECT_TIMEOUT_MS: u64 = 60_000;

/// Upper bound for a single posted document.
const MAX_BODY_LIMIT: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Config file structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub db_url: String,
    pub connect_timeout_ms: u64,
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
            db_url: "sqlite:telemetry.db?mode=rwc".to_string(),
            connect_timeout_ms: 5000,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl Config {
    /// Apply `WEB_PORT` / `DB_URL` overrides. Unparseable values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("WEB_PORT") {
            match raw.trim().parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(value = %raw, "ignoring unparseable WEB_PORT"),
            }
        }
        if let Some(url) = lookup("DB_URL") {
            self.db_url = url;
        }
        self
    }

    /// Validate all settings. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.bind.parse::<IpAddr>().is_err() {
            errors.push(format!("bind '{}' is not an IP address", self.bind));
        }
        if self.port == 0 {
            errors.push("port must be non-zero".to_string());
        }

        if self.db_url.trim().is_empty() {
            errors.push("db_url is empty".to_string());
        } else if !self.db_url.starts_with("sqlite:") {
            errors.push(format!("db_url '{}' must start with 'sqlite:'", self.db_url));
        }

        if !(1..=MAX_CONNECT_TIMEOUT_MS).contains(&self.connect_timeout_ms) {
            errors.push(format!(
                "connect_timeout_ms {} out of range [1, {MAX_CONNECT_TIMEOUT_MS}]",
                self.connect_timeout_ms
            ));
        }
        if !(1..=MAX_BODY_LIMIT).contains(&self.max_body_bytes) {
            errors.push(format!(
                "max_body_bytes {} out of range [1, {MAX_BODY_LIMIT}]",
                self.max_body_bytes
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: {}", self.bind))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read and parse a TOML config file. A missing file yields the defaults.
pub fn load(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        tracing::info!(path, "no config file, using defaults");
        return Ok(Config::default());
    }

    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    Ok(config)
}

/// Load `path`, apply environment overrides, and validate the result.
pub fn resolve<F>(path: &str, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let config = load(path)?.with_env_overrides(lookup);
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
bind = "127.0.0.1"
port = 8080
db_url = "sqlite:/var/lib/telemetry/data.db?mode=rwc"
connect_timeout_ms = 2000
max_body_bytes = 1024
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_body_bytes, 1024);
    }

    #[test]
    fn parse_empty_config_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.connect_timeout_ms, 5000);
        config.validate().unwrap();
    }

    #[test]
    fn parse_rejects_unknown_keys() {
        assert!(toml::from_str::<Config>("colour = \"blue\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = load("/nonexistent/ingest.toml").unwrap();
        assert_eq!(config.port, Config::default().port);
    }

    #[test]
    fn resolve_missing_file_is_valid() {
        let config = resolve("/nonexistent/ingest.toml", no_env).unwrap();
        assert_eq!(config.addr().unwrap().port(), 5000);
    }

    // -- Environment overrides --------------------------------------------

    #[test]
    fn env_overrides_port_and_url() {
        let env: HashMap<&str, &str> =
            HashMap::from([("WEB_PORT", "9000"), ("DB_URL", "sqlite::memory:")]);
        let config = Config::default().with_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 9000);
        assert_eq!(config.db_url, "sqlite::memory:");
    }

    #[test]
    fn env_bad_port_is_ignored() {
        let config = Config::default().with_env_overrides(|k| {
            (k == "WEB_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.port, 5000);
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn bad_bind_rejected() {
        let cfg = Config {
            bind: "localhost:80".into(),
            ..Config::default()
        };
        assert_validation_err(&cfg, "is not an IP address");
    }

    #[test]
    fn zero_port_rejected() {
        let cfg = Config {
            port: 0,
            ..Config::default()
        };
        assert_validation_err(&cfg, "port must be non-zero");
    }

    #[test]
    fn non_sqlite_url_rejected() {
        let cfg = Config {
            db_url: "mongodb://localhost".into(),
            ..Config::default()
        };
        assert_validation_err(&cfg, "must start with 'sqlite:'");
    }

    #[test]
    fn zero_timeout_rejected() {
        let cfg = Config {
            connect_timeout_ms: 0,
            ..Config::default()
        };
        assert_validation_err(&cfg, "connect_timeout_ms 0 out of range");
    }

    #[test]
    fn multiple_errors_collected() {
        let cfg = Config {
            bind: "".into(),
            port: 0,
            db_url: " ".into(),
            connect_timeout_ms: 0,
            max_body_bytes: 0,
        };
        let msg = format!("{:#}", cfg.validate().unwrap_err());
        assert!(msg.contains("5 errors"), "wrong count in: {msg}");
        assert!(msg.contains("db_url is empty"), "missing db_url error in: {msg}");
        assert!(msg.contains("max_body_bytes"), "missing body error in: {msg}");
    }
}
