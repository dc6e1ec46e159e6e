//! Core traits for the EC2 API client collaborator
//!
//! The discovery engine never speaks the EC2 wire protocol itself. A client
//! library is adapted once behind [`Ec2Api`], and an [`Ec2Connector`] builds
//! one per engine start for the region endpoint of the local instance.

use async_trait::async_trait;

use super::credentials::Credentials;
use super::fault::FaultReporter;
use super::model::{DescribeInstancesRequest, DescribeInstancesResponse};

/// Errors surfaced by the EC2 client
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("EC2 client error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether a caller-side retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Throttled(_) | ProviderError::Transport(_))
    }
}

/// Result type for EC2 client operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A connected EC2 client
///
/// Implementations are expected to be safe for concurrent read-only calls;
/// the engine adds no synchronization of its own.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// Run one DescribeInstances query
    async fn describe_instances(
        &self,
        request: &DescribeInstancesRequest,
    ) -> ProviderResult<DescribeInstancesResponse>;

    /// Install the hook for faults the client cannot return as errors.
    ///
    /// Clients without such a channel may ignore it.
    fn register_fault_handler(&mut self, _reporter: FaultReporter) {}

    /// Release connections held by the client
    fn shutdown(&mut self) {}
}

/// Creates EC2 clients for a region endpoint
#[async_trait]
pub trait Ec2Connector: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
        endpoint: &str,
    ) -> ProviderResult<Box<dyn Ec2Api>>;
}
