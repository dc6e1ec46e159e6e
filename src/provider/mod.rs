//! EC2 provider seam
//!
//! This module defines what the discovery engine needs from an EC2 API client:
//! - `traits`: the client and connector interfaces plus their error type
//! - `model`: DescribeInstances request/response shapes
//! - `credentials`: how the client should authenticate
//! - `fault`: the hook for provider faults that are not returned as errors
//! - `memory`: an in-memory stand-in for tests and local runs
//! - `query`: the EC2 Query API connector (feature `query-api`)

pub mod credentials;
pub mod fault;
pub mod memory;
pub mod model;
#[cfg(feature = "query-api")]
pub mod query;
pub mod traits;

pub use credentials::{Credentials, CredentialsProvider, StaticCredentials};
pub use fault::{FaultContext, FaultListener, FaultReporter, TracingFaultListener};
pub use memory::InMemoryEc2;
#[cfg(feature = "query-api")]
pub use query::{QueryEc2Client, QueryEc2Connector};
pub use model::{DescribeInstancesRequest, DescribeInstancesResponse, Instance, Reservation, Tag};
pub use traits::{Ec2Api, Ec2Connector, ProviderError, ProviderResult};
