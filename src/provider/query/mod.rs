//! EC2 Query API connector
//!
//! Talks to the regional EC2 endpoint directly: form-encoded
//! `DescribeInstances` calls signed with SigV4, XML responses. Error bodies
//! are handed to the registered fault listener before being classified into
//! a [`ProviderError`].
//!
//! Credentials come from [`Credentials::resolve`]; with
//! [`Credentials::Default`] the connector looks at `AWS_ACCESS_KEY_ID` /
//! `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN` and then at the instance
//! profile exposed by the metadata service.
//!
//! ```ignore
//! let connector = QueryEc2Connector::new();
//! let mut discovery = AwsAutoDiscovery::build(config, Arc::new(connector)).await?;
//! discovery.start().await?;
//! ```

mod chain;
mod client;
mod signing;
mod xml;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

pub use client::QueryEc2Client;

use crate::config::HttpClientConfig;
use crate::inspector::DEFAULT_BASE_URI;
use crate::provider::{Credentials, Ec2Api, Ec2Connector, ProviderError, ProviderResult};

/// Signing region used when the endpoint does not name one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Region encoded in an `ec2.<region>.amazonaws.com` host
pub fn region_from_host(host: &str) -> Option<String> {
    let rest = host.strip_prefix("ec2.")?;
    let region = rest
        .strip_suffix(".amazonaws.com")
        .or_else(|| rest.strip_suffix(".amazonaws.com.cn"))?;
    if region.is_empty() || region.contains('.') {
        return None;
    }
    Some(region.to_string())
}

/// Endpoint as a URL; bare hosts are reached over HTTPS
fn endpoint_url(endpoint: &str) -> ProviderResult<Url> {
    let raw = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}/", endpoint)
    };
    Url::parse(&raw).map_err(|e| ProviderError::Other(Box::new(e)))
}

fn host_header(url: &Url) -> ProviderResult<String> {
    let host = url
        .host_str()
        .ok_or_else(|| ProviderError::Other(format!("endpoint {} has no host", url).into()))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Connects [`QueryEc2Client`]s
#[derive(Debug, Clone)]
pub struct QueryEc2Connector {
    region: Option<String>,
    metadata_base_uri: String,
    http_client: HttpClientConfig,
}

impl Default for QueryEc2Connector {
    fn default() -> Self {
        Self {
            region: None,
            metadata_base_uri: DEFAULT_BASE_URI.to_string(),
            http_client: HttpClientConfig {
                connect_timeout: Some(5),
                request_timeout: Some(30),
            },
        }
    }
}

impl QueryEc2Connector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign for this region instead of the one in the endpoint host
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Metadata service consulted for instance profile credentials
    pub fn with_metadata_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.metadata_base_uri = base_uri.into();
        self
    }

    pub fn with_http_client(mut self, http_client: HttpClientConfig) -> Self {
        self.http_client = http_client;
        self
    }

    fn signing_region(&self, url: &Url) -> String {
        if let Some(region) = &self.region {
            return region.clone();
        }
        url.host_str()
            .and_then(region_from_host)
            .unwrap_or_else(|| {
                debug!("No region in endpoint {}, signing for {}", url, DEFAULT_REGION);
                DEFAULT_REGION.to_string()
            })
    }
}

#[async_trait]
impl Ec2Connector for QueryEc2Connector {
    async fn connect(
        &self,
        credentials: &Credentials,
        endpoint: &str,
    ) -> ProviderResult<Box<dyn Ec2Api>> {
        let url = endpoint_url(endpoint)?;
        let host = host_header(&url)?;
        let region = self.signing_region(&url);

        let http = Client::builder()
            .connect_timeout(self.http_client.get_connect_timeout())
            .timeout(self.http_client.get_request_timeout())
            .build()
            .map_err(|e| ProviderError::Other(Box::new(e)))?;

        let keys = match credentials.resolve()? {
            Some(keys) => keys,
            None => chain::resolve_default(&http, &self.metadata_base_uri).await?,
        };

        info!(endpoint = %url, region = %region, "EC2 Query API client connected");
        Ok(Box::new(QueryEc2Client::new(http, url, host, region, keys)))
    }
}
