use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::inspector::InspectionError;
use crate::parsers::ParseError;
use crate::provider::ProviderError;
use crate::requests::RequestError;

/// Main error type for EC2 peer discovery
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Metadata endpoint could not be used
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Self-inspection of the local instance failed
    #[error(transparent)]
    Inspection(#[from] InspectionError),

    /// Malformed filter or tag-name input
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Configuration could not be loaded or validated
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The EC2 client could not be created on start
    #[error("Could not connect to EC2 endpoint {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: ProviderError,
    },

    /// A DescribeInstances call failed
    #[error("EC2 DescribeInstances failed")]
    ProviderQuery(#[source] ProviderError),

    /// Discovery was attempted before `start` or after `stop`
    #[error("Discovery is not started")]
    NotStarted,
}

impl DiscoveryError {
    /// Create a connect error
    pub fn connect<S: Into<String>>(endpoint: S, source: ProviderError) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Whether the caller could reasonably retry. Nothing in this crate retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            DiscoveryError::Request(e) => e.is_request_failed(),
            DiscoveryError::Inspection(e) => e.request_error().is_some_and(|r| r.is_request_failed()),
            DiscoveryError::Connect { source, .. } => source.is_transient(),
            DiscoveryError::ProviderQuery(source) => source.is_transient(),
            DiscoveryError::Parse(_) | DiscoveryError::Config(_) | DiscoveryError::NotStarted => {
                false
            }
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DiscoveryError::Parse(_) => ErrorSeverity::Critical,
            DiscoveryError::Config(_) => ErrorSeverity::Critical,
            DiscoveryError::NotStarted => ErrorSeverity::Critical,
            DiscoveryError::Inspection(_) => ErrorSeverity::High,
            DiscoveryError::Connect { .. } => ErrorSeverity::High,
            DiscoveryError::Request(_) => ErrorSeverity::Medium,
            DiscoveryError::ProviderQuery(_) => ErrorSeverity::Medium,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
