//! Credentials handed to the EC2 client
//!
//! The caller's choice travels through [`Ec2Connector::connect`]. Connectors
//! call [`Credentials::resolve`]; `None` means they apply their own default
//! chain.
//!
//! [`Ec2Connector::connect`]: super::Ec2Connector::connect

use std::fmt;
use std::sync::Arc;

use super::ProviderResult;

/// An access/secret key pair, with a session token for temporary credentials
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl StaticCredentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Supplies credentials on demand
pub trait CredentialsProvider: Send + Sync {
    fn credentials(&self) -> ProviderResult<StaticCredentials>;
}

/// How the EC2 client should authenticate
#[derive(Clone, Default)]
pub enum Credentials {
    /// The client's own default chain (environment, profile, instance role)
    #[default]
    Default,
    Static(StaticCredentials),
    Provider(Arc<dyn CredentialsProvider>),
}

impl Credentials {
    pub fn from_keys(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Credentials::Static(StaticCredentials::new(access_key, secret_key))
    }

    /// Resolve to a key pair, or `None` when the client's default chain applies
    pub fn resolve(&self) -> ProviderResult<Option<StaticCredentials>> {
        match self {
            Credentials::Default => Ok(None),
            Credentials::Static(keys) => Ok(Some(keys.clone())),
            Credentials::Provider(provider) => provider.credentials().map(Some),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Default => write!(f, "Credentials::Default"),
            Credentials::Static(keys) => f.debug_tuple("Credentials::Static").field(keys).finish(),
            Credentials::Provider(_) => write!(f, "Credentials::Provider(<CredentialsProvider>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider;

    impl CredentialsProvider for FixedProvider {
        fn credentials(&self) -> ProviderResult<StaticCredentials> {
            Ok(StaticCredentials::new("AKIA_PROVIDED", "provided-secret"))
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::from_keys("AKIAEXAMPLE", "super-secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_resolve() {
        assert_eq!(Credentials::Default.resolve().unwrap(), None);
        assert_eq!(
            Credentials::from_keys("a", "b").resolve().unwrap(),
            Some(StaticCredentials::new("a", "b"))
        );
        let provided = Credentials::Provider(Arc::new(FixedProvider)).resolve().unwrap();
        assert_eq!(provided.unwrap().access_key, "AKIA_PROVIDED");
    }
}
