//! Peer discovery
//!
//! The engine combines explicitly configured filters with filters derived
//! from the local instance's own tags, issues one DescribeInstances query and
//! flattens the reservations into a list of private addresses.

pub mod engine;

#[cfg(test)]
mod tests;

pub use engine::{AwsAutoDiscovery, LifecycleState};
