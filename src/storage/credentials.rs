//! Client credential retrieval, cached once per provider.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use super::CredentialError;

/// Environment variable holding the API client id.
pub const CLIENT_ID_VAR: &str = "TRACKBATCH_CLIENT_ID";

/// Environment variable holding the API client secret.
pub const CLIENT_SECRET_VAR: &str = "TRACKBATCH_CLIENT_SECRET";

/// An API client id and secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Client id, safe to log.
    pub client_id: String,
    /// Client secret, never logged.
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// Source of API client credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the client credentials.
    async fn client_credentials(&self) -> Result<ClientCredentials, CredentialError>;
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials through a variable lookup (the process environment by default).
///
/// The first successful read is cached for the provider's lifetime; failures
/// are not cached, so a later call may succeed once the variables are set.
#[derive(Clone)]
pub struct EnvCredentialProvider {
    lookup: Lookup,
    cache: Arc<OnceCell<ClientCredentials>>,
}

impl EnvCredentialProvider {
    /// Creates a provider reading the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Creates a provider backed by an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
            cache: Arc::new(OnceCell::new()),
        }
    }

    fn read(&self, name: &str) -> Result<String, CredentialError> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CredentialError::Missing {
                name: name.to_string(),
            })
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialProvider")
            .field("cached", &self.cache.initialized())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn client_credentials(&self) -> Result<ClientCredentials, CredentialError> {
        let credentials = self
            .cache
            .get_or_try_init(|| async {
                let client_id = self.read(CLIENT_ID_VAR)?;
                let client_secret = self.read(CLIENT_SECRET_VAR)?;
                debug!(client_id = %client_id, "client credentials loaded");
                Ok::<_, CredentialError>(ClientCredentials {
                    client_id,
                    client_secret,
                })
            })
            .await?;
        Ok(credentials.clone())
    }
}
