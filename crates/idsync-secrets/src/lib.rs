//! Pluggable secret provider abstraction for idsync.
//!
//! Credentials and endpoints can be given literally or as references
//! (`secret:<name>`, `param:<name>`) resolved through a [`SecretProvider`]:
//! environment variables, files, or AWS Secrets Manager / SSM Parameter
//! Store (behind the `aws` feature). Lookups within one run are memoized by
//! [`CachedSecretProvider`], which is built per run and passed explicitly.
//!
//! # Usage
//!
//! ```rust,ignore
//! use idsync_secrets::{build_provider, CachedSecretProvider, ProviderKind, ProviderOptions, SecretRef};
//!
//! let provider = build_provider(ProviderKind::Env, &ProviderOptions::default()).await?;
//! let cache = CachedSecretProvider::new(provider);
//! let token = cache.resolve(&SecretRef::parse("secret:scim_access_token")).await?;
//! ```

pub mod cache;
pub mod provider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

pub use cache::CachedSecretProvider;

pub type SecretResult<T> = Result<T, SecretError>;

/// Failure to resolve a secret or parameter.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("no secret named '{name}'")]
    NotFound { name: String },

    /// Backend could not be reached or refused the caller.
    #[error("{provider} secret backend unavailable: {detail}")]
    ProviderUnavailable { provider: String, detail: String },

    #[error("secret '{name}' is unusable: {detail}")]
    InvalidValue { name: String, detail: String },

    #[error("secret backend misconfigured: {detail}")]
    ConfigError { detail: String },
}

/// Raw bytes fetched for one secret or parameter name.
#[derive(Clone)]
pub struct SecretValue {
    pub name: String,
    pub value: Vec<u8>,
    /// Backend version id, when the backend reports one.
    pub version: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SecretValue {{ name: {:?}, value: [REDACTED], version: {:?} }}",
            self.name, self.version
        )
    }
}

impl SecretValue {
    pub fn new(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value,
            version: None,
            fetched_at: Utc::now(),
        }
    }

    /// Borrow the value as text.
    pub fn as_str(&self) -> Result<&str, SecretError> {
        std::str::from_utf8(&self.value).map_err(|e| SecretError::InvalidValue {
            name: self.name.clone(),
            detail: format!("value is not UTF-8 ({e})"),
        })
    }
}

/// A backend that can look up secrets and parameters by name.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Look up `name`; a missing entry is [`SecretError::NotFound`].
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError>;

    /// Look up a plain parameter. Backends without a parameter store fall
    /// back to [`SecretProvider::get_secret`].
    async fn get_parameter(&self, name: &str) -> Result<SecretValue, SecretError> {
        self.get_secret(name).await
    }

    /// Short backend label used in logs.
    fn provider_type(&self) -> &'static str;
}

/// A configuration value that is either literal or a provider reference.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretRef {
    /// `secret:<name>`
    Secret(String),
    /// `param:<name>`
    Parameter(String),
    /// Any other value, used as is.
    Literal(String),
}

impl std::fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secret(name) => f.debug_tuple("Secret").field(name).finish(),
            Self::Parameter(name) => f.debug_tuple("Parameter").field(name).finish(),
            Self::Literal(_) => f.debug_tuple("Literal").field(&"[REDACTED]").finish(),
        }
    }
}

impl SecretRef {
    /// Parse a raw configuration value.
    pub fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix("secret:") {
            Self::Secret(name.trim().to_string())
        } else if let Some(name) = raw.strip_prefix("param:") {
            Self::Parameter(name.trim().to_string())
        } else {
            Self::Literal(raw.to_string())
        }
    }
}

/// Secret backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderKind {
    #[default]
    Env,
    File,
    Aws,
}

impl FromStr for ProviderKind {
    type Err = SecretError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "env" => Ok(Self::Env),
            "file" => Ok(Self::File),
            "aws" => Ok(Self::Aws),
            unknown => Err(SecretError::ConfigError {
                detail: format!("unknown backend '{unknown}', expected env, file or aws"),
            }),
        }
    }
}

/// Options consumed by the provider factory.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Root directory for the file provider.
    pub secrets_dir: Option<PathBuf>,
    /// AWS region for the aws provider.
    pub region: Option<String>,
}

/// Build a secret provider of the given kind.
pub async fn build_provider(
    kind: ProviderKind,
    options: &ProviderOptions,
) -> SecretResult<Arc<dyn SecretProvider>> {
    let provider: Arc<dyn SecretProvider> = match kind {
        ProviderKind::Env => Arc::new(provider::env::EnvSecretProvider::new()),
        ProviderKind::File => {
            let dir = options.secrets_dir.clone().ok_or(SecretError::ConfigError {
                detail: "the file backend needs --secrets-dir".to_string(),
            })?;
            Arc::new(provider::file::FileSecretProvider::new(dir)?)
        }
        #[cfg(feature = "aws")]
        ProviderKind::Aws => Arc::new(
            provider::aws::AwsSecretProvider::new(options.region.as_deref()).await?,
        ),
        #[cfg(not(feature = "aws"))]
        ProviderKind::Aws => {
            return Err(SecretError::ConfigError {
                detail: "built without the 'aws' feature".to_string(),
            });
        }
    };

    tracing::debug!(provider = provider.provider_type(), "Secret provider built");
    Ok(provider)
}
