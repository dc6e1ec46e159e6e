//! DescribeInstances over the EC2 Query API

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::signing::{self, SigningParams};
use super::xml::{self, ApiError};
use crate::provider::{
    DescribeInstancesRequest, DescribeInstancesResponse, Ec2Api, FaultContext, FaultReporter,
    ProviderError, ProviderResult, StaticCredentials,
};

pub(crate) const API_VERSION: &str = "2016-11-15";
const SERVICE: &str = "ec2";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

const AUTH_CODES: &[&str] = &[
    "AuthFailure",
    "Blocked",
    "ExpiredToken",
    "IncompleteSignature",
    "InvalidClientTokenId",
    "MissingAuthenticationToken",
    "OptInRequired",
    "RequestExpired",
    "SignatureDoesNotMatch",
    "UnauthorizedOperation",
];
const THROTTLE_CODES: &[&str] = &[
    "RequestLimitExceeded",
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
];
const UNAVAILABLE_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
    "Unavailable",
];

/// Form body for a DescribeInstances call
pub(crate) fn encode_request(request: &DescribeInstancesRequest) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("Action", "DescribeInstances");
    form.append_pair("Version", API_VERSION);

    for (i, instance_id) in request.instance_ids.iter().enumerate() {
        form.append_pair(&format!("InstanceId.{}", i + 1), instance_id);
    }
    for (i, filter) in request.filters.iter().enumerate() {
        form.append_pair(&format!("Filter.{}.Name", i + 1), filter.name());
        for (j, value) in filter.values().iter().enumerate() {
            form.append_pair(&format!("Filter.{}.Value.{}", i + 1, j + 1), value);
        }
    }

    form.finish()
}

/// Map a failed call onto the provider error categories
pub(crate) fn classify(status: StatusCode, error: Option<ApiError>) -> ProviderError {
    let (code, message) = match error {
        Some(ApiError { code, message }) => (code, message),
        None => (
            format!("HTTP {}", status.as_u16()),
            status.canonical_reason().unwrap_or("unknown status").to_string(),
        ),
    };
    let detail = || format!("{}: {}", code, message);

    if AUTH_CODES.contains(&code.as_str()) {
        ProviderError::Auth(detail())
    } else if THROTTLE_CODES.contains(&code.as_str()) {
        ProviderError::Throttled(detail())
    } else if UNAVAILABLE_CODES.contains(&code.as_str()) {
        ProviderError::Transport(detail())
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProviderError::Auth(detail())
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Throttled(detail())
    } else if status.is_server_error() {
        ProviderError::Transport(detail())
    } else {
        ProviderError::Rejected { code, message }
    }
}

/// A signed EC2 Query API client bound to one regional endpoint
pub struct QueryEc2Client {
    http: Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: StaticCredentials,
    fault_reporter: Option<FaultReporter>,
}

impl std::fmt::Debug for QueryEc2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEc2Client")
            .field("endpoint", &self.endpoint.as_str())
            .field("region", &self.region)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl QueryEc2Client {
    pub(crate) fn new(
        http: Client,
        endpoint: Url,
        host: String,
        region: String,
        credentials: StaticCredentials,
    ) -> Self {
        Self {
            http,
            endpoint,
            host,
            region,
            credentials,
            fault_reporter: None,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl Ec2Api for QueryEc2Client {
    async fn describe_instances(
        &self,
        request: &DescribeInstancesRequest,
    ) -> ProviderResult<DescribeInstancesResponse> {
        let body = encode_request(request);
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let headers = signing::sign(
            &SigningParams {
                credentials: &self.credentials,
                region: &self.region,
                service: SERVICE,
                amz_date: &amz_date,
            },
            "POST",
            &self.host,
            self.endpoint.path(),
            vec![("content-type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body.as_bytes(),
        );

        let mut builder = self.http.post(self.endpoint.clone()).body(body);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        debug!("POST {} {}", self.endpoint, request);
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("{}: {}", self.endpoint, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("{}: {}", self.endpoint, e)))?;

        if status.is_success() {
            return xml::parse_describe_instances(&text);
        }

        if let Some(reporter) = &self.fault_reporter {
            reporter.report(FaultContext::new(request), &text);
        }
        let error = classify(status, xml::parse_error(&text));
        warn!(status = status.as_u16(), "DescribeInstances failed: {}", error);
        Err(error)
    }

    fn register_fault_handler(&mut self, reporter: FaultReporter) {
        self.fault_reporter = Some(reporter);
    }

    fn shutdown(&mut self) {
        self.fault_reporter = None;
        debug!("EC2 Query API client for {} shut down", self.endpoint);
    }
}
