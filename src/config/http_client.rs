use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ConfigError, ConfigResult};

/// HTTP client configuration for instance metadata requests
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpClientConfig {
    pub connect_timeout: Option<u64>, // seconds
    pub request_timeout: Option<u64>, // seconds
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(2),
            request_timeout: Some(5),
        }
    }
}

impl HttpClientConfig {
    /// Validate HTTP client configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.connect_timeout == Some(0) {
            return Err(ConfigError::invalid(
                "HTTP client connect_timeout must be greater than 0",
            ));
        }

        if self.request_timeout == Some(0) {
            return Err(ConfigError::invalid(
                "HTTP client request_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn get_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.unwrap_or(2))
    }

    pub fn get_request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.unwrap_or(5))
    }
}
