//! Server configuration, read from the environment.
//!
//! | Variable                   | Default                 |
//! |----------------------------|-------------------------|
//! | `INKROOM_STORE_PATH`       | `inkroom_data`          |
//! | `INKROOM_DATABASE`         | `whiteboard`            |
//! | `INKROOM_ALLOWED_ORIGINS`  | `http://localhost:5173` |
//! | `INKROOM_PORT` / `PORT`    | `5000`                  |
//! | `INKROOM_BIND`             | `0.0.0.0`               |
//! | `INKROOM_REJECT_MISUSE`    | `false`                 |
//! | `INKROOM_IN_MEMORY`        | `false`                 |

use std::path::PathBuf;

use crate::engine::EngineConfig;
use crate::storage::StoreConfig;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port in {var}: {value:?}")]
    InvalidPort { var: &'static str, value: String },

    #[error("Invalid boolean in {var}: {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Which browser origins may open a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parse a comma-separated list; `*` anywhere allows every origin.
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(normalize_origin)
            .filter(|o| !o.is_empty())
            .collect();
        if origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }

    /// Whether a handshake carrying `origin` may proceed. Requests without an
    /// `Origin` header come from non-browser clients and are let through.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (AllowedOrigins::Any, _) | (_, None) => true,
            (AllowedOrigins::List(list), Some(origin)) => {
                let origin = normalize_origin(origin);
                list.iter().any(|allowed| *allowed == origin)
            }
        }
    }
}

impl Default for AllowedOrigins {
    fn default() -> Self {
        AllowedOrigins::List(vec![DEFAULT_ORIGIN.to_string()])
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to
    pub bind_addr: String,
    /// Listening port
    pub port: u16,
    /// Root directory of the event store
    pub store_path: PathBuf,
    /// Database name; a directory under `store_path`
    pub database: String,
    /// Origins accepted during the WebSocket handshake
    pub allowed_origins: AllowedOrigins,
    /// Answer misuse with `rejected` instead of dropping it
    pub reject_misuse: bool,
    /// Keep events in process memory instead of RocksDB
    pub in_memory: bool,
    /// History size at which a join logs a warning
    pub history_warn_threshold: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            store_path: PathBuf::from("inkroom_data"),
            database: "whiteboard".to_string(),
            allowed_origins: AllowedOrigins::default(),
            reject_misuse: false,
            in_memory: false,
            history_warn_threshold: EngineConfig::default().history_warn_threshold,
        }
    }
}

impl ServerConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; unset keys keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("INKROOM_STORE_PATH") {
            if path.trim().is_empty() {
                return Err(ConfigError::Empty("INKROOM_STORE_PATH"));
            }
            config.store_path = PathBuf::from(path);
        }
        if let Some(database) = lookup("INKROOM_DATABASE") {
            let database = database.trim();
            if database.is_empty() {
                return Err(ConfigError::Empty("INKROOM_DATABASE"));
            }
            config.database = database.to_string();
        }
        if let Some(origins) = lookup("INKROOM_ALLOWED_ORIGINS") {
            config.allowed_origins = AllowedOrigins::parse(&origins);
        }
        for var in ["INKROOM_PORT", "PORT"] {
            if let Some(value) = lookup(var) {
                config.port = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort { var, value })?;
                break;
            }
        }
        if let Some(bind) = lookup("INKROOM_BIND") {
            if bind.trim().is_empty() {
                return Err(ConfigError::Empty("INKROOM_BIND"));
            }
            config.bind_addr = bind.trim().to_string();
        }
        if let Some(value) = lookup("INKROOM_REJECT_MISUSE") {
            config.reject_misuse = parse_bool("INKROOM_REJECT_MISUSE", value)?;
        }
        if let Some(value) = lookup("INKROOM_IN_MEMORY") {
            config.in_memory = parse_bool("INKROOM_IN_MEMORY", value)?;
        }

        Ok(config)
    }

    /// `host:port` to listen on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::at(self.store_path.join(&self.database))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            reject_misuse: self.reject_misuse,
            history_warn_threshold: self.history_warn_threshold,
        }
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:5000");
        assert_eq!(config.store_config().path, PathBuf::from("inkroom_data/whiteboard"));
        assert!(!config.reject_misuse);
        assert!(!config.in_memory);
        assert!(config.allowed_origins.allows(Some("http://localhost:5173")));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("INKROOM_STORE_PATH", "/var/lib/inkroom"),
            ("INKROOM_DATABASE", "boards"),
            ("INKROOM_PORT", "8080"),
            ("INKROOM_BIND", "127.0.0.1"),
            ("INKROOM_REJECT_MISUSE", "yes"),
            ("INKROOM_IN_MEMORY", "1"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr(), "127.0.0.1:8080");
        assert_eq!(config.store_config().path, PathBuf::from("/var/lib/inkroom/boards"));
        assert!(config.reject_misuse);
        assert!(config.in_memory);
        assert!(config.engine_config().reject_misuse);
    }

    #[test]
    fn test_port_fallback_and_precedence() {
        let config = ServerConfig::from_lookup(lookup(&[("PORT", "7000")])).unwrap();
        assert_eq!(config.port, 7000);

        let config =
            ServerConfig::from_lookup(lookup(&[("PORT", "7000"), ("INKROOM_PORT", "7001")]))
                .unwrap();
        assert_eq!(config.port, 7001);
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            ServerConfig::from_lookup(lookup(&[("INKROOM_PORT", "eighty")])).unwrap_err(),
            ConfigError::InvalidPort {
                var: "INKROOM_PORT",
                value: "eighty".into()
            }
        );
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("INKROOM_IN_MEMORY", "maybe")])),
            Err(ConfigError::InvalidBool { .. })
        ));
        assert_eq!(
            ServerConfig::from_lookup(lookup(&[("INKROOM_DATABASE", "  ")])).unwrap_err(),
            ConfigError::Empty("INKROOM_DATABASE")
        );
    }

    #[test]
    fn test_allowed_origins() {
        let origins = AllowedOrigins::parse("https://draw.example.com/, http://localhost:5173");
        assert!(origins.allows(Some("https://draw.example.com")));
        assert!(origins.allows(Some("HTTP://LOCALHOST:5173")));
        assert!(!origins.allows(Some("https://evil.example.com")));
        assert!(origins.allows(None));

        assert_eq!(AllowedOrigins::parse("*"), AllowedOrigins::Any);
        assert!(AllowedOrigins::parse("http://a, *").allows(Some("http://b")));
    }

    #[test]
    fn test_empty_origin_list_allows_only_headerless() {
        let origins = AllowedOrigins::parse(" , ");
        assert_eq!(origins, AllowedOrigins::List(vec![]));
        assert!(!origins.allows(Some("http://localhost:5173")));
        assert!(origins.allows(None));
    }
}
