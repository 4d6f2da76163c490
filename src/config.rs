//! Server configuration.
//!
//! Settings come from an optional TOML file, then environment variables
//! override individual fields:
//!
//! | Variable      | Field           | Default     |
//! |---------------|-----------------|-------------|
//! | `HOST`        | `host`          | `localhost` |
//! | `PORT`        | `port`          | `3001`      |
//! | `ROUTES_DIR`  | `routes_dir`    | `routes`    |
//! | `WAYPOST_ENV` | `log.format`    | development |
//! | `LOG_LEVEL`   | `log.level`     | see below   |
//!
//! `WAYPOST_ENV=production` switches to JSON logs at `info`; anything else
//! gives human-readable logs at `debug`. `RUST_LOG`, when set, overrides the
//! level at subscriber level (see [`telemetry`](crate::telemetry)).
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! routes_dir = "src/routes"
//!
//! [log]
//! format = "json"
//! level = "info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {var}: `{value}`")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// An `EnvFilter` directive, e.g. `info` or `waypost=debug,hyper=warn`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::Pretty, level: "debug".to_owned() }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub routes_dir: PathBuf,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 3001,
            routes_dir: PathBuf::from("routes"),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Loads `path` (when given), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_owned(), source })?;
        toml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
    }

    /// Applies overrides from `lookup` (the process environment in
    /// production).
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var: "PORT", value: port.clone() })?;
        }
        if let Some(dir) = lookup("ROUTES_DIR") {
            self.routes_dir = PathBuf::from(dir);
        }
        if let Some(env) = lookup("WAYPOST_ENV") {
            self.log = if env.eq_ignore_ascii_case("production") {
                LogConfig { format: LogFormat::Json, level: "info".to_owned() }
            } else {
                LogConfig::default()
            };
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            if level.trim().is_empty() {
                return Err(ConfigError::InvalidEnv { var: "LOG_LEVEL", value: level });
            }
            self.log.level = level;
        }
        Ok(())
    }

    /// `host:port`, as handed to the listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_development() {
        let config = Config::default();
        assert_eq!(config.addr(), "localhost:3001");
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn env_overrides_defaults() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("HOST", "0.0.0.0"), ("PORT", "8080"), ("ROUTES_DIR", "src/routes")]))
            .unwrap();
        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.routes_dir, PathBuf::from("src/routes"));
    }

    #[test]
    fn production_selects_json_info() {
        let mut config = Config::default();
        config.apply_env(env(&[("WAYPOST_ENV", "production")])).unwrap();
        assert_eq!(config.log, LogConfig { format: LogFormat::Json, level: "info".to_owned() });

        config.apply_env(env(&[("LOG_LEVEL", "warn")])).unwrap();
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn bad_port_is_reported() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err.to_string(), "invalid PORT: `eighty`");
    }

    #[test]
    fn file_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypost.toml");
        fs::write(&path, "port = 9000\n[log]\nformat = \"json\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let err = Config::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
