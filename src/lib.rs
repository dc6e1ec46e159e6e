//! # ec2-discovery - cluster peer discovery on EC2
//!
//! Finds the private addresses of the other members of a cluster running on
//! Amazon EC2 by combining configured DescribeInstances filters with the
//! tags of the local instance.
//!
//! ## Features
//!
//! - **Self-inspection**: instance id and availability zone from the metadata service
//! - **Filter grammar**: `name=v1,v2;name2=v3` filters and comma-separated tag names
//! - **Tag-driven discovery**: peers share the local instance's configured tags
//! - **EC2 Query API connector**: SigV4-signed `DescribeInstances` over reqwest
//! - **Pluggable EC2 client**: any [`provider::Ec2Connector`] can back the engine
//! - **Fault listener**: raw provider faults forwarded to a callback
//!
//! ## Example
//!
//! ```rust,no_run
//! use ec2_discovery::{AwsAutoDiscovery, Credentials, DiscoveryConfig, QueryEc2Connector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DiscoveryConfig::parse(
//!         Credentials::Default,
//!         "instance-state-name=running",
//!         Some("Cluster"),
//!     )?;
//!     let connector = QueryEc2Connector::new();
//!     let mut discovery = AwsAutoDiscovery::build(config, Arc::new(connector)).await?;
//!     discovery.start().await?;
//!     for address in discovery.get_private_ip_addresses().await? {
//!         println!("peer {}", address);
//!     }
//!     discovery.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod inspector;
pub mod parsers;
pub mod provider;
pub mod requests;

// Re-export commonly used types
pub use config::{ConfigError, DiscoveryConfig, DiscoverySettings, HttpClientConfig};
pub use discovery::{AwsAutoDiscovery, LifecycleState};
pub use error::{DiscoveryError, DiscoveryResult, ErrorSeverity};
pub use inspector::{InspectionError, InstanceDetails, InstanceInspector, MetadataField};
pub use parsers::{FilterCriterion, ParseError, TagName};
pub use provider::{
    Credentials, Ec2Api, Ec2Connector, FaultListener, InMemoryEc2, ProviderError,
    TracingFaultListener,
};
#[cfg(feature = "query-api")]
pub use provider::{QueryEc2Client, QueryEc2Connector};
pub use requests::RequestError;
