//! Configuration module for the echo fixture.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values. All defaults
//! match the historical fixed values: IPv6 loopback, port 42069, a
//! 4096-byte read buffer, and a quota of one connection.

use crate::retry::RetryPolicy;
use clap::Parser;
use serde::Deserialize;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the echo fixture
#[derive(Parser, Debug)]
#[command(name = "echo-once")]
#[command(version = "0.1.0")]
#[command(about = "A one-shot TCP echo fixture", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., ::1)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Read buffer capacity in bytes; a single read per connection
    /// captures at most this many bytes
    #[arg(short = 'b', long)]
    pub buffer_size: Option<usize>,

    /// Number of connections to serve before exiting
    #[arg(short = 'n', long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub echo: EchoConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connections to serve before exiting
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

/// Echo-related configuration
#[derive(Debug, Deserialize)]
pub struct EchoConfig {
    /// Read buffer capacity in bytes
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_buffer_size(),
        }
    }
}

/// Retry policy for failed accept/echo attempts
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts before giving up (absent = retry forever)
    pub max_attempts: Option<u32>,
    /// Initial backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff delay cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "::1".to_string()
}

fn default_port() -> u16 {
    42069
}

fn default_max_connections() -> usize {
    1
}

fn default_buffer_size() -> usize {
    4096
}

fn default_base_delay_ms() -> u64 {
    10
}

fn default_max_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub read_buffer_size: usize,
    pub max_connections: usize,
    pub retry: RetryPolicy,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(CliArgs::parse())
    }

    fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            read_buffer_size: cli
                .buffer_size
                .unwrap_or(toml_config.echo.read_buffer_size),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            retry: RetryPolicy {
                max_attempts: toml_config.retry.max_attempts,
                base_delay: Duration::from_millis(toml_config.retry.base_delay_ms),
                max_delay: Duration::from_millis(toml_config.retry.max_delay_ms),
            },
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Bind address as a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "::1");
        assert_eq!(config.server.port, 42069);
        assert_eq!(config.server.max_connections, 1);
        assert_eq!(config.echo.read_buffer_size, 4096);
        assert_eq!(config.retry.max_attempts, None);
        assert_eq!(config.retry.base_delay_ms, 10);
        assert_eq!(config.retry.max_delay_ms, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            max_connections = 3

            [echo]
            read_buffer_size = 512

            [retry]
            max_attempts = 5
            base_delay_ms = 50
            max_delay_ms = 2000

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_connections, 3);
        assert_eq!(config.echo.read_buffer_size, 512);
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.base_delay_ms, 50);
        assert_eq!(config.retry.max_delay_ms, 2000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_socket_addr() {
        let config = Config {
            host: "::1".to_string(),
            port: 42069,
            read_buffer_size: 4096,
            max_connections: 1,
            retry: RetryPolicy::default(),
            log_level: "info".to_string(),
        };
        let addr = config.socket_addr().unwrap();
        assert!(addr.is_ipv6());
        assert_eq!(addr.port(), 42069);

        let bad = Config {
            host: "not-an-address".to_string(),
            ..config
        };
        assert!(bad.socket_addr().is_err());
    }
}
