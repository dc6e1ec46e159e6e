//! Instance self-inspection
//!
//! Looks up the instance details from the instance metadata service found at
//! `http://169.254.169.254/`. The base URI can be pointed elsewhere for tests.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};
use url::Url;

use crate::config::HttpClientConfig;
use crate::requests::{self, RequestError};

/// Default location of the instance metadata service
pub const DEFAULT_BASE_URI: &str = "http://169.254.169.254/";

const INSTANCE_ID_PATH: &str = "./latest/meta-data/instance-id";
const AVAILABILITY_ZONE_PATH: &str = "./latest/meta-data/placement/availability-zone";

static ZONE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(.*-\d+)[^-\d]+").expect("zone suffix pattern is valid")
});

/// Identity of the local instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceDetails {
    instance_id: String,
    availability_zone: String,
    endpoint: String,
}

impl InstanceDetails {
    /// Create instance details, deriving the regional EC2 endpoint from the zone
    pub fn new(instance_id: impl Into<String>, availability_zone: impl Into<String>) -> Self {
        let availability_zone = availability_zone.into();
        let endpoint = endpoint_for_zone(&availability_zone);
        Self {
            instance_id: instance_id.into(),
            availability_zone,
            endpoint,
        }
    }

    /// Replace the derived endpoint, e.g. to target a local EC2 stand-in
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn availability_zone(&self) -> &str {
        &self.availability_zone
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Computes the EC2 API endpoint for an availability zone.
///
/// The trailing zone letter is stripped, so `us-east-1a` maps to
/// `ec2.us-east-1.amazonaws.com`.
pub fn endpoint_for_zone(availability_zone: &str) -> String {
    let region = ZONE_SUFFIX.replace_all(availability_zone, "${1}");
    format!("ec2.{}.amazonaws.com", region)
}

/// The metadata field an inspection was fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    InstanceId,
    AvailabilityZone,
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataField::InstanceId => write!(f, "instance id"),
            MetadataField::AvailabilityZone => write!(f, "availability zone"),
        }
    }
}

/// Self-inspection errors
#[derive(Debug, thiserror::Error)]
pub enum InspectionError {
    #[error("Could not retrieve {field}.")]
    Retrieve {
        field: MetadataField,
        #[source]
        source: RequestError,
    },

    #[error("Invalid metadata base uri '{uri}'")]
    InvalidBaseUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Could not create metadata client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
}

impl InspectionError {
    /// The field being fetched when the inspection failed, if any
    pub fn field(&self) -> Option<MetadataField> {
        match self {
            InspectionError::Retrieve { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// The underlying request failure, if any
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            InspectionError::Retrieve { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for self-inspection
pub type InspectionResult<T> = Result<T, InspectionError>;

/// Builder for [`InstanceInspector`]
#[derive(Debug, Clone)]
pub struct InstanceInspectorBuilder {
    base_uri: String,
    http_client: HttpClientConfig,
}

impl Default for InstanceInspectorBuilder {
    fn default() -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            http_client: HttpClientConfig::default(),
        }
    }
}

impl InstanceInspectorBuilder {
    /// Use a different metadata service base URI
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    /// Timeouts for the metadata client
    pub fn with_http_client(mut self, http_client: HttpClientConfig) -> Self {
        self.http_client = http_client;
        self
    }

    /// Resolve the metadata URIs against the base
    pub fn build(self) -> InspectionResult<InstanceInspector> {
        let invalid = |source| InspectionError::InvalidBaseUri {
            uri: self.base_uri.clone(),
            source,
        };

        let base = Url::parse(&self.base_uri).map_err(invalid)?;
        let instance_id_uri = base.join(INSTANCE_ID_PATH).map_err(invalid)?;
        let availability_zone_uri = base.join(AVAILABILITY_ZONE_PATH).map_err(invalid)?;

        Ok(InstanceInspector {
            instance_id_uri,
            availability_zone_uri,
            http_client: self.http_client,
        })
    }
}

/// Reads the local instance identity from the metadata service
#[derive(Debug, Clone)]
pub struct InstanceInspector {
    instance_id_uri: Url,
    availability_zone_uri: Url,
    http_client: HttpClientConfig,
}

impl InstanceInspector {
    pub fn builder() -> InstanceInspectorBuilder {
        InstanceInspectorBuilder::default()
    }

    /// Inspector for the default metadata service
    pub fn build() -> InspectionResult<Self> {
        Self::builder().build()
    }

    pub fn instance_id_uri(&self) -> &Url {
        &self.instance_id_uri
    }

    pub fn availability_zone_uri(&self) -> &Url {
        &self.availability_zone_uri
    }

    /// Fetch the instance id and availability zone, one attempt each.
    ///
    /// The HTTP client lives only for the duration of this call.
    pub async fn inspect(&self) -> InspectionResult<InstanceDetails> {
        let client = Client::builder()
            .connect_timeout(self.http_client.get_connect_timeout())
            .timeout(self.http_client.get_request_timeout())
            .build()
            .map_err(|source| InspectionError::Client { source })?;

        let instance_id = self
            .fetch(&client, MetadataField::InstanceId, &self.instance_id_uri)
            .await?;
        let availability_zone = self
            .fetch(
                &client,
                MetadataField::AvailabilityZone,
                &self.availability_zone_uri,
            )
            .await?;
        drop(client);

        let details = InstanceDetails::new(instance_id, availability_zone);
        info!(
            instance_id = %details.instance_id(),
            availability_zone = %details.availability_zone(),
            endpoint = %details.endpoint(),
            "Inspected local instance"
        );
        Ok(details)
    }

    async fn fetch(
        &self,
        client: &Client,
        field: MetadataField,
        uri: &Url,
    ) -> InspectionResult<String> {
        debug!("Fetching {} from {}", field, uri);
        requests::get_body(client, uri.as_str())
            .await
            .map_err(|source| InspectionError::Retrieve { field, source })
    }
}
