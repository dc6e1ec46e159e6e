//! In-memory EC2 stand-in
//!
//! Serves a fixed set of reservations and evaluates DescribeInstances
//! filters the way EC2 does: criteria are ANDed across names and values are
//! ORed within a name. Useful for exercising discovery without an AWS account.
//!
//! Supported filter names: `instance-id`, `private-ip-address`, `tag-key`,
//! `tag-value` and `tag:<key>`. Anything else is rejected the way EC2 rejects
//! an unknown filter.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::credentials::Credentials;
use super::fault::{FaultContext, FaultReporter};
use super::model::{DescribeInstancesRequest, DescribeInstancesResponse, Instance, Reservation};
use super::traits::{Ec2Api, Ec2Connector, ProviderError, ProviderResult};
use crate::parsers::FilterCriterion;

type FailureFn = dyn Fn() -> ProviderError + Send + Sync;

#[derive(Default)]
struct SharedState {
    reservations: Vec<Reservation>,
    requests: Vec<DescribeInstancesRequest>,
    endpoints: Vec<String>,
    fault_reporter: Option<FaultReporter>,
    fail_describe: Option<Arc<FailureFn>>,
    fail_connect: Option<Arc<FailureFn>>,
}

/// Shared handle to an in-memory EC2 account
#[derive(Clone, Default)]
pub struct InMemoryEc2 {
    state: Arc<Mutex<SharedState>>,
    shutdowns: Arc<AtomicUsize>,
}

impl std::fmt::Debug for InMemoryEc2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEc2")
            .field("shutdowns", &self.shutdowns.load(Ordering::SeqCst))
            .finish()
    }
}

impl InMemoryEc2 {
    pub fn new(reservations: Vec<Reservation>) -> Self {
        let ec2 = Self::default();
        ec2.lock().reservations = reservations;
        ec2
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SharedState> {
        // recover from poisoning
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a reservation holding the given instances
    pub fn add_reservation(&self, instances: Vec<Instance>) {
        let mut state = self.lock();
        let reservation_id = format!("r-{:08x}", state.reservations.len() + 1);
        state.reservations.push(Reservation {
            reservation_id: Some(reservation_id),
            instances,
        });
    }

    /// Make every DescribeInstances call fail with the produced error
    pub fn fail_describe_with<F>(&self, failure: F)
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        self.lock().fail_describe = Some(Arc::new(failure));
    }

    /// Make every connect attempt fail with the produced error
    pub fn fail_connect_with<F>(&self, failure: F)
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        self.lock().fail_connect = Some(Arc::new(failure));
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<DescribeInstancesRequest> {
        self.lock().requests.clone()
    }

    /// Endpoints connected to so far
    pub fn endpoints(&self) -> Vec<String> {
        self.lock().endpoints.clone()
    }

    /// Number of client shutdowns observed
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Whether a fault handler is currently registered
    pub fn has_fault_handler(&self) -> bool {
        self.lock().fault_reporter.is_some()
    }

    /// Push a raw error body through the registered fault handler, if any
    pub fn emit_fault(&self, request: &DescribeInstancesRequest, body: &str) {
        let reporter = self.lock().fault_reporter.clone();
        if let Some(reporter) = reporter {
            reporter.report(FaultContext::new(request), body);
        }
    }

    fn describe(&self, request: &DescribeInstancesRequest) -> ProviderResult<DescribeInstancesResponse> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        if let Some(failure) = &state.fail_describe {
            return Err(failure());
        }

        let mut reservations = Vec::new();
        for reservation in &state.reservations {
            let mut instances = Vec::new();
            for instance in &reservation.instances {
                if matches_request(instance, request)? {
                    instances.push(instance.clone());
                }
            }
            if !instances.is_empty() {
                reservations.push(Reservation {
                    reservation_id: reservation.reservation_id.clone(),
                    instances,
                });
            }
        }

        debug!(
            "In-memory DescribeInstances matched {} reservations",
            reservations.len()
        );
        Ok(DescribeInstancesResponse { reservations })
    }
}

fn matches_request(instance: &Instance, request: &DescribeInstancesRequest) -> ProviderResult<bool> {
    if !request.instance_ids.is_empty() && !request.instance_ids.contains(&instance.instance_id) {
        return Ok(false);
    }
    for filter in &request.filters {
        if !matches_filter(instance, filter)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_filter(instance: &Instance, filter: &FilterCriterion) -> ProviderResult<bool> {
    let values = filter.values();
    let matched = match filter.name() {
        "instance-id" => values.contains(&instance.instance_id),
        "private-ip-address" => instance
            .private_ip_address
            .as_ref()
            .is_some_and(|ip| values.contains(ip)),
        "tag-key" => instance.tags.iter().any(|t| values.contains(&t.key)),
        "tag-value" => instance.tags.iter().any(|t| values.contains(&t.value)),
        name => match name.strip_prefix("tag:") {
            Some(key) => instance
                .tags
                .iter()
                .any(|t| t.key == key && values.contains(&t.value)),
            None => {
                return Err(ProviderError::Rejected {
                    code: "InvalidParameterValue".to_string(),
                    message: format!("The filter '{}' is invalid", name),
                })
            }
        },
    };
    Ok(matched)
}

struct InMemoryClient {
    ec2: InMemoryEc2,
}

#[async_trait]
impl Ec2Api for InMemoryClient {
    async fn describe_instances(
        &self,
        request: &DescribeInstancesRequest,
    ) -> ProviderResult<DescribeInstancesResponse> {
        self.ec2.describe(request)
    }

    fn register_fault_handler(&mut self, reporter: FaultReporter) {
        self.ec2.lock().fault_reporter = Some(reporter);
    }

    fn shutdown(&mut self) {
        self.ec2.lock().fault_reporter = None;
        self.ec2.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Ec2Connector for InMemoryEc2 {
    async fn connect(
        &self,
        _credentials: &Credentials,
        endpoint: &str,
    ) -> ProviderResult<Box<dyn Ec2Api>> {
        let mut state = self.lock();
        if let Some(failure) = &state.fail_connect {
            return Err(failure());
        }
        state.endpoints.push(endpoint.to_string());
        drop(state);

        Ok(Box::new(InMemoryClient { ec2: self.clone() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> InMemoryEc2 {
        let ec2 = InMemoryEc2::default();
        ec2.add_reservation(vec![
            Instance::new("i-1")
                .with_private_ip("10.0.0.1")
                .with_tag("Cluster", "blue"),
            Instance::new("i-2")
                .with_private_ip("10.0.0.2")
                .with_tag("Cluster", "green"),
        ]);
        ec2.add_reservation(vec![Instance::new("i-3")
            .with_private_ip("10.0.0.3")
            .with_tag("Cluster", "blue")
            .with_tag("Role", "db")]);
        ec2
    }

    fn ids(response: &DescribeInstancesResponse) -> Vec<String> {
        response.instances().map(|i| i.instance_id.clone()).collect()
    }

    #[test]
    fn test_filters_and_across_names_or_within_values() {
        let ec2 = account();

        let request = DescribeInstancesRequest::new()
            .with_filters([FilterCriterion::new("tag:Cluster", ["blue", "green"]).unwrap()]);
        assert_eq!(ids(&ec2.describe(&request).unwrap()), ["i-1", "i-2", "i-3"]);

        let request = DescribeInstancesRequest::new().with_filters([
            FilterCriterion::new("tag:Cluster", ["blue"]).unwrap(),
            FilterCriterion::new("tag:Role", ["db"]).unwrap(),
        ]);
        let response = ec2.describe(&request).unwrap();
        assert_eq!(ids(&response), ["i-3"]);
        assert_eq!(response.reservations.len(), 1);
    }

    #[test]
    fn test_instance_id_lookup() {
        let ec2 = account();
        let request = DescribeInstancesRequest::new().with_instance_ids(["i-2"]);
        assert_eq!(ids(&ec2.describe(&request).unwrap()), ["i-2"]);
        assert_eq!(ec2.requests().len(), 1);
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let ec2 = account();
        let request = DescribeInstancesRequest::new()
            .with_filters([FilterCriterion::new("bogus-filter", ["x"]).unwrap()]);
        let err = ec2.describe(&request).unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { .. }));
    }
}
