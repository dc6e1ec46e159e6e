//! AWS Signature Version 4 for Query API requests

use sha2::{Digest, Sha256};

use crate::provider::StaticCredentials;

const HMAC_BLOCK_SIZE: usize = 64;
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Who signs, for which region and service, at what time
#[derive(Debug, Clone, Copy)]
pub(crate) struct SigningParams<'a> {
    pub credentials: &'a StaticCredentials,
    pub region: &'a str,
    pub service: &'a str,
    /// Request time as `YYYYMMDDTHHMMSSZ`
    pub amz_date: &'a str,
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

/// HMAC-SHA256 (RFC 2104)
pub(crate) fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut block = [0u8; HMAC_BLOCK_SIZE];
    if key.len() > HMAC_BLOCK_SIZE {
        block[..32].copy_from_slice(&Sha256::digest(key));
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha256::new();
    inner.update(block.map(|b| b ^ 0x36));
    inner.update(message);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(block.map(|b| b ^ 0x5c));
    outer.update(inner_hash);

    let mut mac = [0u8; 32];
    mac.copy_from_slice(&outer.finalize());
    mac
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> [u8; 32] {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Sign a request without query parameters.
///
/// `headers` are the caller's own headers; `host`, `x-amz-date`,
/// `x-amz-content-sha256` and, for temporary credentials,
/// `x-amz-security-token` are added and signed. Returns every header to send,
/// `authorization` included. `host` is signed but not returned since the
/// HTTP client sets it from the URL.
pub(crate) fn sign(
    params: &SigningParams<'_>,
    method: &str,
    host: &str,
    path: &str,
    headers: Vec<(String, String)>,
    body: &[u8],
) -> Vec<(String, String)> {
    let date = &params.amz_date[..8.min(params.amz_date.len())];
    let payload_hash = sha256_hex(body);

    let mut headers: Vec<(String, String)> = headers
        .into_iter()
        .map(|(name, value)| (name.to_lowercase(), value.trim().to_string()))
        .collect();
    headers.push(("host".to_string(), host.to_string()));
    headers.push(("x-amz-date".to_string(), params.amz_date.to_string()));
    headers.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
    if let Some(token) = &params.credentials.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, path, canonical_headers, signed_headers, payload_hash
    );

    let scope = format!("{}/{}/{}/aws4_request", date, params.region, params.service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        params.amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(
        &params.credentials.secret_key,
        date,
        params.region,
        params.service,
    );
    let signature = hex_encode(&hmac_sha256(&key, string_to_sign.as_bytes()));

    headers.retain(|(name, _)| name != "host");
    headers.push((
        "authorization".to_string(),
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, params.credentials.access_key, scope, signed_headers, signature
        ),
    ));
    headers
}
