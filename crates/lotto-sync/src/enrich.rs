//! Player identity enrichment
//!
//! Looks up display names and avatars for purchasing addresses from
//! the identity service. Resolution is strictly best-effort: lookups
//! that fail or miss return `None` and must never block ingestion.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved player identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name
    pub username: Option<String>,
    /// Avatar image URL
    pub avatar_url: Option<String>,
}

/// Best-effort address-to-identity lookup.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve an address. Never errors; failures are `None`.
    async fn resolve(&self, address: &str) -> Option<Identity>;
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    username: Option<String>,
    profile_picture_url: Option<String>,
}

/// [`IdentityResolver`] backed by the identity HTTP API, with a
/// process-lifetime cache so each address is looked up once.
pub struct HttpIdentityResolver {
    http: reqwest::Client,
    base_url: String,
    cache: Mutex<HashMap<String, Option<Identity>>>,
}

impl HttpIdentityResolver {
    /// Create a resolver for an identity service base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(LOOKUP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(&self, address: &str) -> Option<Identity> {
        let url = format!(
            "{}/addresses/{}",
            self.base_url.trim_end_matches('/'),
            address
        );
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            debug!(address, status = %response.status(), "identity lookup miss");
            return None;
        }
        let body: IdentityResponse = response.json().await.ok()?;
        Some(Identity {
            username: body.username,
            avatar_url: body.profile_picture_url,
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, address: &str) -> Option<Identity> {
        let key = address.to_ascii_lowercase();
        {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let resolved = self.fetch(&key).await;
        self.cache.lock().await.insert(key, resolved.clone());
        resolved
    }
}

/// Resolver that never finds anything. Used when no identity service
/// is configured.
pub struct NullIdentityResolver;

#[async_trait]
impl IdentityResolver for NullIdentityResolver {
    async fn resolve(&self, _address: &str) -> Option<Identity> {
        None
    }
}
