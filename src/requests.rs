//! Request helpers for reading instance metadata
//!
//! A single GET is issued per call. Transport faults are reported as
//! [`RequestError::RequestFailed`]; a reachable endpoint that answers with a
//! non-200 status or an unreadable body is reported as
//! [`RequestError::InvalidResponse`]. Nothing here retries.

use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

/// Errors raised while talking to an HTTP endpoint
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The request never produced a response (refused, timed out, bad URI, ...)
    #[error("could not get {uri}")]
    RequestFailed {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered, but not with something usable
    #[error("{message}")]
    InvalidResponse {
        uri: String,
        message: String,
        status: StatusCode,
        headers: HeaderMap,
        #[source]
        source: Option<reqwest::Error>,
    },
}

impl RequestError {
    /// The URI the failed request targeted
    pub fn uri(&self) -> &str {
        match self {
            RequestError::RequestFailed { uri, .. } => uri,
            RequestError::InvalidResponse { uri, .. } => uri,
        }
    }

    /// Status code of the raw response, if one was received
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::RequestFailed { .. } => None,
            RequestError::InvalidResponse { status, .. } => Some(*status),
        }
    }

    /// Whether the endpoint was never reached
    pub fn is_request_failed(&self) -> bool {
        matches!(self, RequestError::RequestFailed { .. })
    }
}

/// Result type for request helpers
pub type RequestResult<T> = Result<T, RequestError>;

/// Gets the body of the content returned from a GET request to `uri`.
///
/// Any status other than `200 OK` is an [`RequestError::InvalidResponse`]
/// naming the URI and the status code.
///
/// Bodies that are not valid UTF-8 are decoded lossily rather than rejected;
/// the unreadable-body error only covers faults while reading the stream.
pub async fn get_body(client: &Client, uri: &str) -> RequestResult<String> {
    let response = get_response(client, uri).await?;
    let status = response.status();
    let headers = response.headers().clone();

    if status != StatusCode::OK {
        return Err(RequestError::InvalidResponse {
            uri: uri.to_string(),
            message: format!("{} return status {}", uri, status.as_u16()),
            status,
            headers,
            source: None,
        });
    }

    response
        .text()
        .await
        .map_err(|e| RequestError::InvalidResponse {
            uri: uri.to_string(),
            message: format!("failed to parse body of {}", uri),
            status,
            headers,
            source: Some(e),
        })
}

/// Performs a GET against `uri` and returns the raw response.
pub async fn get_response(client: &Client, uri: &str) -> RequestResult<Response> {
    debug!("GET {}", uri);
    client
        .get(uri)
        .send()
        .await
        .map_err(|e| RequestError::RequestFailed {
            uri: uri.to_string(),
            source: e,
        })
}
