//! Fills in missing track metadata from the upstream API before a batch runs.
//!
//! Descriptors that already carry a title, an artist and a URL are left
//! alone. The rest are looked up concurrently with
//! `GET {api_base}/tracks/{id}?client_id=...` through the shared
//! [`FetchClient`], so lookups respect the process-wide rate gate.

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::BatchError;
use crate::fetch::{FetchClient, FetchError};
use crate::item::{DescriptorUser, ItemDescriptor};
use crate::storage::CredentialProvider;

/// Default base URL of the track metadata API.
pub const DEFAULT_API_BASE: &str = "https://api.soundcloud.com";

/// Subset of the upstream track payload used to complete descriptors.
#[derive(Debug, Clone, Default, Deserialize)]
struct TrackMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    permalink_url: Option<String>,
    #[serde(default)]
    user: Option<DescriptorUser>,
}

/// Completes descriptors with metadata fetched from the upstream API.
#[derive(Clone)]
pub struct MetadataResolver {
    client: FetchClient,
    credentials: Arc<dyn CredentialProvider>,
    api_base: String,
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl MetadataResolver {
    /// Creates a resolver against `api_base` (no trailing slash needed).
    pub fn new(
        client: FetchClient,
        credentials: Arc<dyn CredentialProvider>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            credentials,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Returns true if `descriptor` has an id but lacks title, artist or URL.
    #[must_use]
    pub fn needs_lookup(descriptor: &ItemDescriptor) -> bool {
        descriptor.id.is_some()
            && (blank(descriptor.title.as_deref())
                || descriptor.artist_name().is_none()
                || (blank(descriptor.url.as_deref())
                    && blank(descriptor.permalink_url.as_deref())))
    }

    /// Completes every descriptor that needs it, preserving order.
    ///
    /// A track the API does not know (HTTP 404) is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::CredentialUnavailable`] when no client id can be
    /// obtained and [`BatchError::Upstream`] for any other failed lookup.
    #[instrument(skip(self, descriptors), fields(descriptors = descriptors.len()))]
    pub async fn resolve(
        &self,
        descriptors: Vec<ItemDescriptor>,
    ) -> Result<Vec<ItemDescriptor>, BatchError> {
        let pending = descriptors.iter().filter(|d| Self::needs_lookup(d)).count();
        if pending == 0 {
            return Ok(descriptors);
        }
        let credentials = self.credentials.client_credentials().await?;
        debug!(pending, "resolving track metadata");

        let lookups = descriptors
            .into_iter()
            .map(|descriptor| self.complete(descriptor, &credentials.client_id));
        try_join_all(lookups).await
    }

    async fn complete(
        &self,
        mut descriptor: ItemDescriptor,
        client_id: &str,
    ) -> Result<ItemDescriptor, BatchError> {
        let id = match descriptor.id.as_ref() {
            Some(id) if Self::needs_lookup(&descriptor) => id.to_string(),
            _ => return Ok(descriptor),
        };
        let url = self.track_url(&id, client_id)?;

        let metadata: TrackMetadata = match self.client.get(url.as_str(), &[]).await {
            Ok(metadata) => metadata,
            Err(FetchError::Upstream { status: 404, .. }) => {
                warn!(track_id = %id, "track not found upstream, keeping request fields");
                return Ok(descriptor);
            }
            Err(error) => return Err(error.into()),
        };

        if blank(descriptor.title.as_deref()) {
            descriptor.title = metadata.title;
        }
        if descriptor.artist_name().is_none() {
            descriptor.user = metadata.user;
        }
        if blank(descriptor.url.as_deref()) && blank(descriptor.permalink_url.as_deref()) {
            descriptor.permalink_url = metadata.permalink_url;
        }
        Ok(descriptor)
    }

    fn track_url(&self, id: &str, client_id: &str) -> Result<Url, BatchError> {
        let mut url = Url::parse(&format!("{}/tracks/", self.api_base))
            .and_then(|base| base.join(id))
            .map_err(|_| BatchError::from(FetchError::invalid_url(&self.api_base)))?;
        url.query_pairs_mut().append_pair("client_id", client_id);
        Ok(url)
    }
}

fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
