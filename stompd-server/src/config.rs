//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via STOMPD_CONFIG)
//! 3. Environment variables
//!
//! The command-line bootstrap applies its own arguments on top of the result.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Accept-loop strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One dedicated OS thread per connection, blocking I/O.
    #[default]
    Blocking,
    /// Many connections multiplexed on a fixed tokio worker pool.
    Reactor,
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(Self::Blocking),
            "reactor" => Ok(Self::Reactor),
            other => Err(ConfigError::InvalidStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::Reactor => write!(f, "reactor"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Accept-loop strategy.
    pub strategy: Strategy,
    /// Network configuration.
    pub network: NetworkConfig,
    /// Session behavior configuration.
    pub session: SessionConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(path) = std::env::var("STOMPD_CONFIG") {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(strategy) = std::env::var("STOMPD_STRATEGY") {
            self.strategy = strategy.parse()?;
        }
        self.network.apply_env_overrides();
        self.session.apply_env_overrides();
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Worker threads for the reactor strategy.
    pub workers: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                stompd_protocol::DEFAULT_PORT,
            ),
            max_connections: 1024,
            workers: 2,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("STOMPD_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
        if let Ok(max) = std::env::var("STOMPD_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
        if let Ok(workers) = std::env::var("STOMPD_WORKERS") {
            if let Ok(n) = workers.parse() {
                self.workers = n;
            }
        }
    }
}

/// Session behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether a SEND to a destination the sender never subscribed to
    /// terminates the session (the strict variant) or only answers with an
    /// ERROR frame.
    pub terminate_on_unsubscribed_send: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            terminate_on_unsubscribed_send: true,
        }
    }
}

impl SessionConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("STOMPD_TERMINATE_ON_UNSUBSCRIBED_SEND") {
            self.terminate_on_unsubscribed_send = v == "1" || v.eq_ignore_ascii_case("true");
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("invalid strategy '{0}' (expected 'blocking' or 'reactor')")]
    InvalidStrategy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.strategy, Strategy::Blocking);
        assert_eq!(config.network.bind_addr.port(), stompd_protocol::DEFAULT_PORT);
        assert!(config.session.terminate_on_unsubscribed_send);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("blocking".parse::<Strategy>().unwrap(), Strategy::Blocking);
        assert_eq!("reactor".parse::<Strategy>().unwrap(), Strategy::Reactor);
        assert!(matches!(
            "threaded".parse::<Strategy>(),
            Err(ConfigError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn test_strategy_display_roundtrip() {
        for strategy in [Strategy::Blocking, Strategy::Reactor] {
            assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.strategy = Strategy::Reactor;
        config.network.workers = 8;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.strategy, Strategy::Reactor);
        assert_eq!(parsed.network.workers, 8);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("strategy: reactor\n").unwrap();
        assert_eq!(parsed.strategy, Strategy::Reactor);
        assert_eq!(parsed.network.max_connections, 1024);
    }
}
