//! DescribeInstances request and response shapes
//!
//! Field names follow the EC2 API so a collaborator can (de)serialize them
//! directly from its own wire representation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::parsers::FilterCriterion;

/// Query for instances, by explicit id and/or by filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instance_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterCriterion>,
}

impl DescribeInstancesRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instance_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_filters(mut self, filters: impl IntoIterator<Item = FilterCriterion>) -> Self {
        self.filters.extend(filters);
        self
    }
}

impl fmt::Display for DescribeInstancesRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DescribeInstances(")?;
        if !self.instance_ids.is_empty() {
            write!(f, "InstanceIds=[{}]", self.instance_ids.join(","))?;
            if !self.filters.is_empty() {
                write!(f, " ")?;
            }
        }
        let filters: Vec<String> = self.filters.iter().map(ToString::to_string).collect();
        if !filters.is_empty() {
            write!(f, "Filters=[{}]", filters.join(";"))?;
        }
        write!(f, ")")
    }
}

/// Reservations returned by a DescribeInstances call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesResponse {
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

impl DescribeInstancesResponse {
    /// Every instance across every reservation, in provider order
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.reservations.iter().flat_map(|r| r.instances.iter())
    }
}

/// A launch cohort of instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reservation {
    #[serde(default)]
    pub reservation_id: Option<String>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub instance_id: String,
    #[serde(default)]
    pub private_ip_address: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Instance {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }

    pub fn with_private_ip(mut self, address: impl Into<String>) -> Self {
        self.private_ip_address = Some(address.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
