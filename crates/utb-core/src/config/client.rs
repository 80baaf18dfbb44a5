//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;
use crate::types::{Endpoint, LogLevel, ProjectContext, ProjectParams, SettingsContext};

/// Configuration for the test-generation client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service endpoint
    pub server: Endpoint,

    /// Bound on connecting plus handshaking
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Interval between heartbeats on a live session
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Minimum level of server log lines to stream
    pub server_log_level: LogLevel,

    /// Project sent with every generation call
    pub project: ProjectContext,

    /// Generation settings sent with every generation call
    pub generation: SettingsContext,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: Endpoint::default(),
            connect_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(5),
            server_log_level: LogLevel::default(),
            project: ProjectContext::default(),
            generation: SettingsContext::default(),
        }
    }
}

impl ClientConfig {
    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid("connect_timeout must be positive".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat_interval must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Project and settings for a generation call against `target`
    pub fn project_params(&self, target: Option<String>) -> ProjectParams {
        ProjectParams {
            project: self.project.clone(),
            settings: self.generation.clone(),
            target,
        }
    }
}
