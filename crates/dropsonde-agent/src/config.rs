// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::AgentError;
use std::env;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_UDP_PORT: u16 = 42420;
pub const DEFAULT_TCP_PORT: u16 = 42421;
pub const DEFAULT_TCP_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the agent and its two listeners
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address both listeners bind to (e.g., "0.0.0.0")
    pub host: String,
    /// UDP listening port, 0 for an ephemeral port
    pub udp_port: u16,
    /// TCP listening port, 0 for an ephemeral port
    pub tcp_port: u16,
    /// Deadline for reading one payload from an accepted TCP connection
    pub tcp_read_timeout: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// Log every forwarded envelope through the logging emitter
    pub debug: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            udp_port: DEFAULT_UDP_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            tcp_read_timeout: DEFAULT_TCP_READ_TIMEOUT,
            log_level: "info".to_string(),
            debug: false,
        }
    }
}

impl AgentConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, AgentError> {
        let host = env::var("DROPSONDE_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let udp_port = env::var("DROPSONDE_UDP_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_UDP_PORT);
        let tcp_port = env::var("DROPSONDE_TCP_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_TCP_PORT);
        let tcp_read_timeout = env::var("DROPSONDE_TCP_READ_TIMEOUT_MS")
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TCP_READ_TIMEOUT);
        let log_level = env::var("DROPSONDE_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());
        let debug = env::var("DROPSONDE_DEBUG")
            .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);

        let config = Self {
            host,
            udp_port,
            tcp_port,
            tcp_read_timeout,
            log_level,
            debug,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.host.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "DROPSONDE_HOST cannot be empty".to_string(),
            ));
        }

        if self.tcp_read_timeout.is_zero() {
            return Err(AgentError::InvalidConfig(
                "TCP read timeout must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(AgentError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.udp_port, 42420);
        assert_eq!(config.tcp_port, 42421);
        assert_eq!(config.tcp_read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_ephemeral_ports_are_valid() {
        let config = AgentConfig {
            udp_port: 0,
            tcp_port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_read_timeout() {
        let config = AgentConfig {
            tcp_read_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_host() {
        let config = AgentConfig {
            host: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = AgentConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AgentError::InvalidConfig(_))
        ));
    }
}
