//! Default credential chain: environment first, then the instance profile

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::provider::{ProviderError, ProviderResult, StaticCredentials};
use crate::requests;

const SECURITY_CREDENTIALS_PATH: &str = "./latest/meta-data/iam/security-credentials/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceProfileCredentials {
    code: String,
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

/// Credentials from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, with an
/// optional `AWS_SESSION_TOKEN`
pub(crate) fn from_env<F>(lookup: F) -> Option<StaticCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let credentials = StaticCredentials::new(
        non_empty("AWS_ACCESS_KEY_ID")?,
        non_empty("AWS_SECRET_ACCESS_KEY")?,
    );
    Some(match non_empty("AWS_SESSION_TOKEN") {
        Some(token) => credentials.with_session_token(token),
        None => credentials,
    })
}

/// Temporary credentials of the instance role, read from the metadata service
pub(crate) async fn from_instance_profile(
    client: &Client,
    metadata_base_uri: &str,
) -> ProviderResult<StaticCredentials> {
    let unavailable = |detail: String| {
        ProviderError::Auth(format!("no instance profile credentials: {}", detail))
    };

    let roles_uri = Url::parse(metadata_base_uri)
        .and_then(|base| base.join(SECURITY_CREDENTIALS_PATH))
        .map_err(|e| unavailable(e.to_string()))?;

    let roles = requests::get_body(client, roles_uri.as_str())
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    let role = roles
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| unavailable("no role attached to the instance".to_string()))?;

    let role_uri = roles_uri
        .join(role)
        .map_err(|e| unavailable(e.to_string()))?;
    let document = requests::get_body(client, role_uri.as_str())
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    let profile: InstanceProfileCredentials = serde_json::from_str(&document)
        .map_err(|e| ProviderError::Malformed(format!("instance profile credentials: {}", e)))?;
    if profile.code != "Success" {
        return Err(unavailable(format!("role {} returned {}", role, profile.code)));
    }

    debug!("Using instance profile credentials of role {}", role);
    let credentials = StaticCredentials::new(profile.access_key_id, profile.secret_access_key);
    Ok(match profile.token {
        Some(token) => credentials.with_session_token(token),
        None => credentials,
    })
}

// TODO: instance profile credentials expire after a few hours; refresh them
// from the Expiration field instead of holding them for the client's lifetime.
pub(crate) async fn resolve_default(
    client: &Client,
    metadata_base_uri: &str,
) -> ProviderResult<StaticCredentials> {
    if let Some(credentials) = from_env(|name| std::env::var(name).ok()) {
        debug!("Using credentials from the environment");
        return Ok(credentials);
    }
    from_instance_profile(client, metadata_base_uri).await
}
