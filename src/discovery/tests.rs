//! Discovery engine unit tests
//!
//! The engine runs against the in-memory EC2 stand-in.

use std::sync::{Arc, Mutex};

use crate::config::DiscoveryConfig;
use crate::discovery::engine::tags_as_filters;
use crate::discovery::{AwsAutoDiscovery, LifecycleState};
use crate::error::DiscoveryError;
use crate::inspector::InstanceDetails;
use crate::parsers::{self, FilterCriterion, TagName};
use crate::provider::{
    Credentials, DescribeInstancesRequest, FaultListener, InMemoryEc2, Instance, ProviderError,
    Tag,
};

fn local_details() -> InstanceDetails {
    InstanceDetails::new("i-local", "us-east-1a")
}

// Helper function to create a two-reservation account
fn create_test_account() -> InMemoryEc2 {
    let ec2 = InMemoryEc2::default();
    ec2.add_reservation(vec![Instance::new("i-local")
        .with_private_ip("10.0.0.1")
        .with_tag("Cluster", "blue")
        .with_tag("Environment", "prod")
        .with_tag("Name", "node-1")]);
    ec2.add_reservation(vec![
        Instance::new("i-peer-1")
            .with_private_ip("10.0.0.2")
            .with_tag("Cluster", "blue")
            .with_tag("Environment", "prod"),
        Instance::new("i-peer-2")
            .with_private_ip("10.0.0.3")
            .with_tag("Cluster", "green")
            .with_tag("Environment", "prod"),
    ]);
    ec2
}

fn engine(ec2: &InMemoryEc2, config: DiscoveryConfig) -> AwsAutoDiscovery {
    AwsAutoDiscovery::new(config, local_details(), Arc::new(ec2.clone()))
}

fn tag_config(tags: &str) -> DiscoveryConfig {
    DiscoveryConfig::parse(Credentials::Default, "", Some(tags)).unwrap()
}

#[cfg(test)]
mod flattening_tests {
    use super::*;

    #[tokio::test]
    async fn test_flattens_reservations_in_order() {
        let ec2 = InMemoryEc2::default();
        ec2.add_reservation(vec![Instance::new("i-1").with_private_ip("10.0.0.1")]);
        ec2.add_reservation(vec![
            Instance::new("i-2").with_private_ip("10.0.0.2"),
            Instance::new("i-3").with_private_ip("10.0.0.3"),
        ]);

        let mut discovery = engine(&ec2, DiscoveryConfig::default());
        discovery.start().await.unwrap();

        let addresses = discovery.get_private_ip_addresses().await.unwrap();
        assert_eq!(addresses, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[tokio::test]
    async fn test_instances_without_address_are_skipped() {
        let ec2 = InMemoryEc2::default();
        ec2.add_reservation(vec![
            Instance::new("i-1").with_private_ip("10.0.0.1"),
            Instance::new("i-pending"),
            Instance::new("i-3").with_private_ip("10.0.0.3"),
        ]);

        let mut discovery = engine(&ec2, DiscoveryConfig::default());
        discovery.start().await.unwrap();

        let addresses = discovery.get_private_ip_addresses().await.unwrap();
        assert_eq!(addresses, ["10.0.0.1", "10.0.0.3"]);
    }

    #[tokio::test]
    async fn test_duplicate_addresses_are_kept() {
        let ec2 = InMemoryEc2::default();
        ec2.add_reservation(vec![Instance::new("i-1").with_private_ip("10.0.0.1")]);
        ec2.add_reservation(vec![Instance::new("i-2").with_private_ip("10.0.0.1")]);

        let mut discovery = engine(&ec2, DiscoveryConfig::default());
        discovery.start().await.unwrap();

        let addresses = discovery.get_private_ip_addresses().await.unwrap();
        assert_eq!(addresses, ["10.0.0.1", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_no_matches_is_empty_not_error() {
        let ec2 = create_test_account();
        let config = DiscoveryConfig::parse(Credentials::Default, "tag:Cluster=red", None).unwrap();
        let mut discovery = engine(&ec2, config);
        discovery.start().await.unwrap();

        assert!(discovery.get_private_ip_addresses().await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod filter_tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_filters_only_single_query() {
        let ec2 = create_test_account();
        let config =
            DiscoveryConfig::parse(Credentials::Default, "tag:Cluster=blue", None).unwrap();
        let mut discovery = engine(&ec2, config);
        discovery.start().await.unwrap();

        let addresses = discovery.get_private_ip_addresses().await.unwrap();
        assert_eq!(addresses, ["10.0.0.1", "10.0.0.2"]);

        let requests = ec2.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].instance_ids.is_empty());
        assert_eq!(requests[0].filters.len(), 1);
    }

    #[tokio::test]
    async fn test_tag_names_derive_filters_from_local_tags() {
        let ec2 = create_test_account();
        let mut discovery = engine(&ec2, tag_config("Cluster"));
        discovery.start().await.unwrap();

        let addresses = discovery.get_private_ip_addresses().await.unwrap();
        assert_eq!(addresses, ["10.0.0.1", "10.0.0.2"]);

        let requests = ec2.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].instance_ids, ["i-local"]);
        assert_eq!(
            requests[1].filters,
            vec![FilterCriterion::new("tag:Cluster", ["blue"]).unwrap()]
        );
    }

    #[tokio::test]
    async fn test_local_tags_flattened_across_reservations() {
        let ec2 = InMemoryEc2::default();
        ec2.add_reservation(vec![Instance::new("i-local")
            .with_private_ip("10.0.0.1")
            .with_tag("Cluster", "blue")]);
        ec2.add_reservation(vec![Instance::new("i-local")
            .with_private_ip("10.0.0.1")
            .with_tag("Env", "prod")]);
        ec2.add_reservation(vec![
            Instance::new("i-peer")
                .with_private_ip("10.0.0.2")
                .with_tag("Cluster", "blue")
                .with_tag("Env", "prod"),
            Instance::new("i-stranger")
                .with_private_ip("10.0.0.3")
                .with_tag("Cluster", "blue"),
        ]);

        let mut discovery = engine(&ec2, tag_config("Cluster,Env"));
        discovery.start().await.unwrap();

        let addresses = discovery.get_private_ip_addresses().await.unwrap();
        assert_eq!(addresses, ["10.0.0.2"]);
        assert_eq!(
            ec2.requests()[1].filters,
            vec![
                FilterCriterion::new("tag:Cluster", ["blue"]).unwrap(),
                FilterCriterion::new("tag:Env", ["prod"]).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_unconfigured_tags_do_not_become_filters() {
        let ec2 = create_test_account();
        let mut discovery = engine(&ec2, tag_config("Environment"));
        discovery.start().await.unwrap();

        let addresses = discovery.get_private_ip_addresses().await.unwrap();
        assert_eq!(addresses, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);

        let filter_names: Vec<String> = ec2.requests()[1]
            .filters
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(filter_names, ["tag:Environment"]);
    }

    #[tokio::test]
    async fn test_tag_filters_precede_explicit_filters() {
        let ec2 = create_test_account();
        let config = DiscoveryConfig::parse(
            Credentials::Default,
            "private-ip-address=10.0.0.2,10.0.0.3",
            Some("Cluster"),
        )
        .unwrap();
        let mut discovery = engine(&ec2, config);
        discovery.start().await.unwrap();

        let addresses = discovery.get_private_ip_addresses().await.unwrap();
        assert_eq!(addresses, ["10.0.0.2"]);

        let names: Vec<String> = ec2.requests()[1]
            .filters
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, ["tag:Cluster", "private-ip-address"]);
    }

    #[tokio::test]
    async fn test_same_name_filters_are_not_merged() {
        let ec2 = create_test_account();
        let config =
            DiscoveryConfig::parse(Credentials::Default, "tag:Cluster=green", Some("Cluster"))
                .unwrap();
        let mut discovery = engine(&ec2, config);
        discovery.start().await.unwrap();

        assert!(discovery.get_private_ip_addresses().await.unwrap().is_empty());
        assert_eq!(ec2.requests()[1].filters.len(), 2);
    }

    #[test]
    fn test_tags_as_filters_respects_tag_names() {
        let tags = vec![
            Tag::new("Cluster", "blue"),
            Tag::new("Name", "node-1"),
            Tag::new("Cluster", "blue-2"),
        ];
        let names = parsers::tag_names(Some("Cluster")).unwrap();

        let filters = tags_as_filters(&tags, &names);
        assert_eq!(
            filters,
            vec![
                FilterCriterion::new("tag:Cluster", ["blue"]).unwrap(),
                FilterCriterion::new("tag:Cluster", ["blue-2"]).unwrap(),
            ]
        );

        assert!(tags_as_filters(&tags, &[]).is_empty());
    }

    #[test]
    fn test_tags_with_empty_value_are_skipped() {
        let tags = vec![Tag::new("Cluster", "")];
        let names = vec![TagName::new("Cluster").unwrap()];
        assert!(tags_as_filters(&tags, &names).is_empty());
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_discovery_before_start_fails() {
        let ec2 = create_test_account();
        let discovery = engine(&ec2, DiscoveryConfig::default());

        assert_eq!(discovery.state(), LifecycleState::Created);
        let err = discovery.get_private_ip_addresses().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NotStarted));
        assert!(ec2.requests().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_after_stop_fails() {
        let ec2 = create_test_account();
        let mut discovery = engine(&ec2, DiscoveryConfig::default());
        discovery.start().await.unwrap();
        discovery.stop();

        assert_eq!(discovery.state(), LifecycleState::Stopped);
        let err = discovery.get_private_ip_addresses().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NotStarted));
    }

    #[tokio::test]
    async fn test_start_connects_to_zone_endpoint() {
        let ec2 = create_test_account();
        let mut discovery = engine(&ec2, DiscoveryConfig::default());
        discovery.start().await.unwrap();

        assert_eq!(discovery.state(), LifecycleState::Started);
        assert_eq!(ec2.endpoints(), ["ec2.us-east-1.amazonaws.com"]);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let ec2 = create_test_account();
        let mut discovery = engine(&ec2, DiscoveryConfig::default());

        discovery.stop();
        discovery.stop();
        assert_eq!(ec2.shutdowns(), 0);

        discovery.start().await.unwrap();
        discovery.stop().stop();
        discovery.close();
        assert_eq!(ec2.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_restart_replaces_client() {
        let ec2 = create_test_account();
        let mut discovery = engine(&ec2, DiscoveryConfig::default());
        discovery.start().await.unwrap();
        discovery.start().await.unwrap();

        assert_eq!(ec2.shutdowns(), 1);
        assert_eq!(ec2.endpoints().len(), 2);
        assert!(discovery.get_private_ip_addresses().await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_releases_client() {
        let ec2 = create_test_account();
        {
            let mut discovery = engine(&ec2, DiscoveryConfig::default());
            discovery.start().await.unwrap();
        }
        assert_eq!(ec2.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces() {
        let ec2 = create_test_account();
        ec2.fail_connect_with(|| ProviderError::Auth("no credentials".to_string()));
        let mut discovery = engine(&ec2, DiscoveryConfig::default());

        let err = discovery.start().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Connect { .. }));
        assert_eq!(discovery.state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn test_build_uses_supplied_details() {
        let ec2 = create_test_account();
        let config = DiscoveryConfig::default()
            .with_instance_details(InstanceDetails::new("i-given", "eu-west-1c"))
            .with_metadata_base_uri("http://127.0.0.1:9/");

        let discovery = AwsAutoDiscovery::build(config, Arc::new(ec2.clone()))
            .await
            .unwrap();
        assert_eq!(discovery.instance_details().instance_id(), "i-given");
        assert_eq!(
            discovery.instance_details().endpoint(),
            "ec2.eu-west-1.amazonaws.com"
        );
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_metadata_base() {
        let config = DiscoveryConfig::default()
            .with_instance_details(local_details())
            .with_metadata_base_uri("not a uri");

        let err = AwsAutoDiscovery::build(config, Arc::new(create_test_account()))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Inspection(_)));
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_query_failure_has_no_partial_result() {
        let ec2 = create_test_account();
        ec2.fail_describe_with(|| ProviderError::Throttled("Request limit exceeded".to_string()));
        let mut discovery = engine(&ec2, DiscoveryConfig::default());
        discovery.start().await.unwrap();

        let err = discovery.get_private_ip_addresses().await.unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::ProviderQuery(ProviderError::Throttled(_))
        ));
        assert!(err.is_retryable());
        assert_eq!(ec2.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_tag_lookup_failure_stops_discovery() {
        let ec2 = create_test_account();
        ec2.fail_describe_with(|| ProviderError::Auth("UnauthorizedOperation".to_string()));
        let mut discovery = engine(&ec2, tag_config("Cluster"));
        discovery.start().await.unwrap();

        let err = discovery.get_private_ip_addresses().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ProviderQuery(ProviderError::Auth(_))));
        assert_eq!(ec2.requests().len(), 1);
        assert!(!ec2.requests()[0].instance_ids.is_empty());
    }

    #[tokio::test]
    async fn test_server_side_filter_rejection() {
        let ec2 = create_test_account();
        let config = DiscoveryConfig::parse(Credentials::Default, "no-such-filter=x", None).unwrap();
        let mut discovery = engine(&ec2, config);
        discovery.start().await.unwrap();

        let err = discovery.get_private_ip_addresses().await.unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::ProviderQuery(ProviderError::Rejected { .. })
        ));
    }
}

#[cfg(test)]
mod fault_listener_tests {
    use super::*;

    struct Recorder(Mutex<Vec<String>>);

    impl FaultListener for Recorder {
        fn fault(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn test_listener_registered_on_start() {
        let ec2 = create_test_account();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let config = DiscoveryConfig::default().with_fault_listener(recorder.clone());
        let mut discovery = engine(&ec2, config);

        assert!(!ec2.has_fault_handler());
        discovery.start().await.unwrap();
        assert!(ec2.has_fault_handler());

        let request = DescribeInstancesRequest::new().with_instance_ids(["i-local"]);
        ec2.emit_fault(&request, "<Response><Errors/></Response>");

        let messages = recorder.0.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("AWS Exception: [<Response><Errors/></Response>]"));
        assert!(messages[0].contains("i-local"));

        discovery.stop();
        assert!(!ec2.has_fault_handler());
    }

    #[tokio::test]
    async fn test_no_listener_no_registration() {
        let ec2 = create_test_account();
        let mut discovery = engine(&ec2, DiscoveryConfig::default());
        discovery.start().await.unwrap();
        assert!(!ec2.has_fault_handler());
    }
}
