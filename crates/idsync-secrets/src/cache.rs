//! Per-run memoization of secret and parameter lookups.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{SecretError, SecretProvider, SecretRef, SecretValue};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Secret(String),
    Parameter(String),
}

/// A `SecretProvider` wrapper that fetches every name at most once.
///
/// Entries never expire: the cache lives exactly as long as one run.
pub struct CachedSecretProvider {
    inner: Arc<dyn SecretProvider>,
    entries: RwLock<HashMap<CacheKey, SecretValue>>,
}

impl CachedSecretProvider {
    /// Create a new cached provider wrapping the given inner provider.
    pub fn new(inner: Arc<dyn SecretProvider>) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Resolve a configuration value to its string form.
    pub async fn resolve(&self, reference: &SecretRef) -> Result<String, SecretError> {
        let value = match reference {
            SecretRef::Literal(value) => return Ok(value.clone()),
            SecretRef::Secret(name) => self.get_secret(name).await?,
            SecretRef::Parameter(name) => self.get_parameter(name).await?,
        };
        Ok(value.as_str()?.to_string())
    }

    async fn get_or_fetch(&self, key: CacheKey) -> Result<SecretValue, SecretError> {
        if let Some(cached) = self.entries.read().await.get(&key) {
            tracing::debug!(key = ?key, "Secret cache hit");
            return Ok(cached.clone());
        }

        let value = match &key {
            CacheKey::Secret(name) => self.inner.get_secret(name).await?,
            CacheKey::Parameter(name) => self.inner.get_parameter(name).await?,
        };
        tracing::info!(
            secret_name = %value.name,
            provider = self.inner.provider_type(),
            "Secret loaded from provider"
        );

        self.entries.write().await.insert(key, value.clone());
        Ok(value)
    }
}

impl std::fmt::Debug for CachedSecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSecretProvider")
            .field("provider_type", &self.inner.provider_type())
            .finish()
    }
}

#[async_trait]
impl SecretProvider for CachedSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        self.get_or_fetch(CacheKey::Secret(name.to_string())).await
    }

    async fn get_parameter(&self, name: &str) -> Result<SecretValue, SecretError> {
        self.get_or_fetch(CacheKey::Parameter(name.to_string()))
            .await
    }

    fn provider_type(&self) -> &'static str {
        self.inner.provider_type()
    }
}
