//! EC2 auto discovery engine
//!
//! Finds cluster members by asking EC2 which instances match the configured
//! filters, optionally narrowed by the tags of the local instance.
//!
//! ### Requirements
//!
//! * The instances must be in the same region as the local instance.
//! * `ec2:DescribeInstances` must be allowed for the configured credentials
//!   or the instance profile.
//! * Security groups must allow the cluster traffic between discovered nodes.
//!
//! An instance is returned when it matches every filter name and any of the
//! values given for that name. To cluster with every running `m1.small`:
//!
//! ```ignore
//! let config = DiscoveryConfig::parse(
//!     Credentials::from_keys("YOUR_AWS_ACCESS_KEY", "YOUR_AWS_SECRET_KEY"),
//!     "instance-state-name=running;instance-type=m1.small",
//!     None,
//! )?;
//! let mut discovery = AwsAutoDiscovery::build(config, Arc::new(connector)).await?;
//! discovery.start().await?;
//! let peers = discovery.get_private_ip_addresses().await?;
//! ```
//!
//! The engine holds no locks. `start`/`stop` take `&mut self`, so callers
//! serialize them; concurrent discovery calls are as safe as the
//! [`Ec2Api`] implementation behind them.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::inspector::{InstanceDetails, InstanceInspector};
use crate::parsers::{FilterCriterion, TagName};
use crate::provider::{
    DescribeInstancesRequest, Ec2Api, Ec2Connector, FaultReporter, Tag,
};

/// Lifecycle of a discovery engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Started,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Created => write!(f, "created"),
            LifecycleState::Started => write!(f, "started"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Discovers the private addresses of cluster peers through EC2
pub struct AwsAutoDiscovery {
    config: DiscoveryConfig,
    instance_details: InstanceDetails,
    connector: Arc<dyn Ec2Connector>,
    ec2: Option<Box<dyn Ec2Api>>,
    state: LifecycleState,
}

impl fmt::Debug for AwsAutoDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsAutoDiscovery")
            .field("config", &self.config)
            .field("instance_details", &self.instance_details)
            .field("state", &self.state)
            .finish()
    }
}

impl AwsAutoDiscovery {
    /// Create an engine for a known local identity
    pub fn new(
        config: DiscoveryConfig,
        instance_details: InstanceDetails,
        connector: Arc<dyn Ec2Connector>,
    ) -> Self {
        Self {
            config,
            instance_details,
            connector,
            ec2: None,
            state: LifecycleState::Created,
        }
    }

    /// Create an engine, inspecting the local instance unless the
    /// configuration already carries its identity.
    ///
    /// The metadata base URI must be valid even when no inspection happens.
    pub async fn build(
        config: DiscoveryConfig,
        connector: Arc<dyn Ec2Connector>,
    ) -> DiscoveryResult<Self> {
        let inspector = InstanceInspector::builder()
            .with_base_uri(config.metadata_base_uri())
            .with_http_client(config.http_client().clone())
            .build()?;
        Self::build_with_inspector(config, connector, &inspector).await
    }

    pub async fn build_with_inspector(
        config: DiscoveryConfig,
        connector: Arc<dyn Ec2Connector>,
        inspector: &InstanceInspector,
    ) -> DiscoveryResult<Self> {
        let instance_details = match config.instance_details() {
            Some(details) => details.clone(),
            None => inspector.inspect().await?,
        };
        Ok(Self::new(config, instance_details, connector))
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn instance_details(&self) -> &InstanceDetails {
        &self.instance_details
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Connect to the regional EC2 endpoint and register the fault listener.
    pub async fn start(&mut self) -> DiscoveryResult<&mut Self> {
        if self.ec2.is_some() {
            debug!("Discovery already started, replacing EC2 client");
            self.close();
        }

        let endpoint = self.instance_details.endpoint().to_string();
        let mut ec2 = self
            .connector
            .connect(self.config.credentials(), &endpoint)
            .await
            .map_err(|e| DiscoveryError::connect(endpoint.clone(), e))?;

        if let Some(listener) = self.config.fault_listener() {
            ec2.register_fault_handler(FaultReporter::new(Arc::clone(listener)));
        }

        self.ec2 = Some(ec2);
        self.state = LifecycleState::Started;
        info!(
            endpoint = %endpoint,
            instance_id = %self.instance_details.instance_id(),
            "EC2 discovery started"
        );
        Ok(self)
    }

    /// Quietly stop the engine. Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) -> &mut Self {
        self.close();
        self
    }

    /// Release the EC2 client, if one is held
    pub fn close(&mut self) {
        if let Some(mut ec2) = self.ec2.take() {
            ec2.shutdown();
            info!("EC2 discovery stopped");
        }
        self.state = LifecycleState::Stopped;
    }

    /// Private IP addresses of every instance matching the configured
    /// filters and the local instance's configured tags, in EC2 order.
    ///
    /// Instances without a private address are skipped.
    pub async fn get_private_ip_addresses(&self) -> DiscoveryResult<Vec<String>> {
        let ec2 = self.ec2.as_deref().ok_or(DiscoveryError::NotStarted)?;

        let mut filters = Vec::new();
        if !self.config.tag_names().is_empty() {
            let tags = self.request_instance_tags(ec2).await?;
            filters.extend(tags_as_filters(&tags, self.config.tag_names()));
        }
        filters.extend(self.config.filters().iter().cloned());

        let request = DescribeInstancesRequest::new().with_filters(filters);
        debug!("Querying EC2 with {}", request);
        let response = ec2
            .describe_instances(&request)
            .await
            .map_err(DiscoveryError::ProviderQuery)?;

        // flatten every reservation
        let mut addresses = Vec::new();
        for instance in response.instances() {
            match &instance.private_ip_address {
                Some(address) => addresses.push(address.clone()),
                None => debug!(
                    "Instance {} has no private address, skipping",
                    instance.instance_id
                ),
            }
        }

        info!(
            filters = request.filters.len(),
            addresses = addresses.len(),
            "EC2 discovery round complete"
        );
        Ok(addresses)
    }

    /// All tags on the local instance, across every returned reservation
    async fn request_instance_tags(&self, ec2: &dyn Ec2Api) -> DiscoveryResult<Vec<Tag>> {
        let request = DescribeInstancesRequest::new()
            .with_instance_ids([self.instance_details.instance_id()]);
        let response = ec2
            .describe_instances(&request)
            .await
            .map_err(DiscoveryError::ProviderQuery)?;

        let tags: Vec<Tag> = response
            .instances()
            .flat_map(|instance| instance.tags.iter().cloned())
            .collect();
        debug!(
            "Local instance {} carries {} tags",
            self.instance_details.instance_id(),
            tags.len()
        );
        Ok(tags)
    }
}

impl Drop for AwsAutoDiscovery {
    fn drop(&mut self) {
        if let Some(mut ec2) = self.ec2.take() {
            ec2.shutdown();
        }
    }
}

/// Turn the tags whose key is one of `tag_names` into `tag:<key>` filters.
///
/// Tags with an empty value cannot form a filter and are skipped.
pub(crate) fn tags_as_filters(tags: &[Tag], tag_names: &[TagName]) -> Vec<FilterCriterion> {
    tags.iter()
        .filter(|tag| tag_names.iter().any(|name| name.as_str() == tag.key))
        .filter_map(|tag| match FilterCriterion::for_tag(&tag.key, tag.value.as_str()) {
            Ok(filter) => Some(filter),
            Err(e) => {
                warn!("Ignoring tag {} on local instance: {}", tag.key, e);
                None
            }
        })
        .collect()
}
