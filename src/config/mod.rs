//! # Discovery configuration
//!
//! Two layers:
//!
//! - [`DiscoverySettings`]: raw, serde-deserializable settings as an operator
//!   writes them (TOML, with `${VAR}` / `${VAR:-default}` expansion)
//! - [`DiscoveryConfig`]: the validated, immutable configuration the engine
//!   is built from. Filter and tag-name grammars are checked here, so a bad
//!   configuration fails before any network activity.
//!
//! ## Example
//!
//! ```toml
//! filters = "instance-state-name=running;instance-type=m1.small"
//! tag_names = "Cluster, Environment"
//! access_key = "${AWS_ACCESS_KEY_ID}"
//! secret_key = "${AWS_SECRET_ACCESS_KEY}"
//!
//! [http_client]
//! connect_timeout = 2
//! request_timeout = 5
//! ```

pub mod http_client;

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use http_client::HttpClientConfig;

use crate::inspector::{InstanceDetails, DEFAULT_BASE_URI};
use crate::parsers::{self, FilterCriterion, ParseError, TagName};
use crate::provider::{Credentials, FaultListener};

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid discovery configuration: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Raw discovery settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoverySettings {
    /// Static access key; omit both keys to use the client's default chain
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Filter expression, e.g. `instance-state-name=running;tag:Env=prod`
    pub filters: Option<String>,
    /// Comma separated tag names to match against the local instance
    pub tag_names: Option<String>,
    /// Instance metadata service base URI
    pub metadata_base_uri: Option<String>,
    /// Skip self-inspection and use this identity instead
    pub instance_id: Option<String>,
    pub availability_zone: Option<String>,
    /// Override the EC2 endpoint derived from the availability zone
    pub endpoint: Option<String>,
    pub http_client: Option<HttpClientConfig>,
}

impl DiscoverySettings {
    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let settings: DiscoverySettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file, expanding environment variables first
    pub async fn from_file_with_env<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let settings = Self::from_toml_str(&expand_env_vars(&content))?;

        info!("Discovery settings loaded from {:?}", path.as_ref());
        Ok(settings)
    }

    /// Validate the settings without building a configuration
    pub fn validate(&self) -> ConfigResult<()> {
        match (&self.access_key, &self.secret_key) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::invalid(
                    "access_key and secret_key must be set together",
                ));
            }
            (Some(access), Some(_)) if access.trim().is_empty() => {
                return Err(ConfigError::invalid("access_key cannot be empty"));
            }
            _ => {}
        }

        match (&self.instance_id, &self.availability_zone) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::invalid(
                    "instance_id and availability_zone must be set together",
                ));
            }
            (None, None) if self.endpoint.is_some() => {
                warn!("endpoint override is ignored without instance_id and availability_zone");
            }
            _ => {}
        }

        if let Some(http_client) = &self.http_client {
            http_client.validate()?;
        }

        Ok(())
    }
}

/// Validated, immutable discovery configuration
#[derive(Clone, Default)]
pub struct DiscoveryConfig {
    credentials: Credentials,
    filters: Vec<FilterCriterion>,
    tag_names: Vec<TagName>,
    fault_listener: Option<Arc<dyn FaultListener>>,
    instance_details: Option<InstanceDetails>,
    metadata_base_uri: Option<String>,
    http_client: HttpClientConfig,
}

impl fmt::Debug for DiscoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryConfig")
            .field("credentials", &self.credentials)
            .field("filters", &self.filters)
            .field("tag_names", &self.tag_names)
            .field(
                "fault_listener",
                &self.fault_listener.as_ref().map(|_| "<FaultListener>"),
            )
            .field("instance_details", &self.instance_details)
            .field("metadata_base_uri", &self.metadata_base_uri)
            .field("http_client", &self.http_client)
            .finish()
    }
}

impl DiscoveryConfig {
    pub fn new(
        credentials: Credentials,
        filters: Vec<FilterCriterion>,
        tag_names: Vec<TagName>,
    ) -> Self {
        Self {
            credentials,
            filters,
            tag_names,
            ..Self::default()
        }
    }

    /// Build a configuration from the textual filter and tag-name grammars
    pub fn parse(
        credentials: Credentials,
        filters: &str,
        tag_names: Option<&str>,
    ) -> ConfigResult<Self> {
        Ok(Self::new(
            credentials,
            parsers::filters(filters)?,
            parsers::tag_names(tag_names)?,
        ))
    }

    /// Build a configuration from raw settings
    pub fn from_settings(settings: &DiscoverySettings) -> ConfigResult<Self> {
        settings.validate()?;

        let credentials = match (&settings.access_key, &settings.secret_key) {
            (Some(access), Some(secret)) => Credentials::from_keys(access, secret),
            _ => Credentials::Default,
        };

        let mut config = Self::parse(
            credentials,
            settings.filters.as_deref().unwrap_or(""),
            settings.tag_names.as_deref(),
        )?;

        if let (Some(id), Some(zone)) = (&settings.instance_id, &settings.availability_zone) {
            let mut details = InstanceDetails::new(id, zone);
            if let Some(endpoint) = &settings.endpoint {
                details = details.with_endpoint(endpoint);
            }
            config.instance_details = Some(details);
        }
        config.metadata_base_uri = settings.metadata_base_uri.clone();
        config.http_client = settings.http_client.clone().unwrap_or_default();

        Ok(config)
    }

    pub fn with_fault_listener(mut self, listener: Arc<dyn FaultListener>) -> Self {
        self.fault_listener = Some(listener);
        self
    }

    /// Use this identity instead of inspecting the local instance
    pub fn with_instance_details(mut self, details: InstanceDetails) -> Self {
        self.instance_details = Some(details);
        self
    }

    pub fn with_metadata_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.metadata_base_uri = Some(base_uri.into());
        self
    }

    pub fn with_http_client(mut self, http_client: HttpClientConfig) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn filters(&self) -> &[FilterCriterion] {
        &self.filters
    }

    pub fn tag_names(&self) -> &[TagName] {
        &self.tag_names
    }

    pub fn fault_listener(&self) -> Option<&Arc<dyn FaultListener>> {
        self.fault_listener.as_ref()
    }

    pub fn instance_details(&self) -> Option<&InstanceDetails> {
        self.instance_details.as_ref()
    }

    pub fn metadata_base_uri(&self) -> &str {
        self.metadata_base_uri.as_deref().unwrap_or(DEFAULT_BASE_URI)
    }

    pub fn http_client(&self) -> &HttpClientConfig {
        &self.http_client
    }
}

/// Expand environment variables in configuration content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let mut search_from = 0;

    while let Some(offset) = result[search_from..].find("${") {
        let start = search_from + offset;
        let Some(end) = result[start..].find('}') else {
            break; // Malformed ${VAR expression
        };

        let var_expr = &result[start + 2..start + end];
        let replacement = if let Some(default_pos) = var_expr.find(":-") {
            let var_name = &var_expr[..default_pos];
            let default_value = &var_expr[default_pos + 2..];
            env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        } else {
            env::var(var_expr).unwrap_or_else(|_| {
                warn!(
                    "Environment variable '{}' not found, using empty string",
                    var_expr
                );
                String::new()
            })
        };

        result.replace_range(start..start + end + 1, &replacement);
        search_from = start + replacement.len();
    }

    result
}
