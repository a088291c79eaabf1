//! Directory client configuration and credentials.

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use crate::{DirectoryError, DirectoryResult};

/// Default Admin SDK Directory API base URL.
pub const DEFAULT_BASE_URL: &str = "https://admin.googleapis.com/admin/directory/v1";

/// Default Google `OAuth2` token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only scopes needed to list users, groups and members.
pub const DIRECTORY_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/admin.directory.group.readonly",
    "https://www.googleapis.com/auth/admin.directory.group.member.readonly",
    "https://www.googleapis.com/auth/admin.directory.user.readonly",
];

/// A Google service-account key with domain-wide delegation.
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key_id: Option<String>,
    pub private_key: SecretString,
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawServiceAccountKey {
    #[serde(rename = "type")]
    key_type: Option<String>,
    client_email: String,
    private_key: String,
    private_key_id: Option<String>,
    token_uri: Option<String>,
}

/// Credentials used to authenticate against the Directory API.
pub enum GoogleCredentials {
    /// Service-account key; tokens are minted by impersonating the admin.
    ServiceAccount(ServiceAccountKey),
    /// Pre-issued access token.
    AccessToken(SecretString),
}

impl std::fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
            Self::AccessToken(_) => f.debug_tuple("AccessToken").field(&"[REDACTED]").finish(),
        }
    }
}

impl GoogleCredentials {
    /// Parse a service-account JSON key document.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Config` if the document is not a service-account key.
    pub fn from_service_account_json(json: &str) -> DirectoryResult<Self> {
        let raw: RawServiceAccountKey = serde_json::from_str(json).map_err(|e| {
            DirectoryError::Config(format!("Invalid service account credentials: {e}"))
        })?;

        if let Some(kind) = raw.key_type.as_deref() {
            if kind != "service_account" {
                return Err(DirectoryError::Config(format!(
                    "Unsupported credentials type '{kind}', expected 'service_account'"
                )));
            }
        }
        if raw.client_email.trim().is_empty() {
            return Err(DirectoryError::Config(
                "Service account credentials have no client_email".into(),
            ));
        }
        if !raw.private_key.contains("PRIVATE KEY") {
            return Err(DirectoryError::Config(
                "Service account credentials have no PEM private_key".into(),
            ));
        }

        Ok(Self::ServiceAccount(ServiceAccountKey {
            client_email: raw.client_email,
            private_key_id: raw.private_key_id,
            private_key: SecretString::from(raw.private_key),
            token_uri: raw
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        }))
    }

    /// Wrap a pre-issued access token.
    pub fn access_token(token: impl Into<String>) -> Self {
        Self::AccessToken(SecretString::from(token.into()))
    }
}

/// Configuration for [`GoogleDirectoryClient`](crate::GoogleDirectoryClient).
#[derive(Debug)]
pub struct DirectoryConfig {
    /// Workspace administrator impersonated by the service account.
    pub admin_email: String,
    pub credentials: GoogleCredentials,
    /// Directory API base URL.
    pub base_url: String,
    /// Customer selector for list calls.
    pub customer: String,
    /// Page size for list calls.
    pub page_size: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl DirectoryConfig {
    /// Create a configuration with default endpoint and paging.
    pub fn new(admin_email: impl Into<String>, credentials: GoogleCredentials) -> Self {
        Self {
            admin_email: admin_email.into(),
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            customer: "my_customer".to_string(),
            page_size: 200,
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Config` when a required value is missing.
    pub fn validate(&self) -> DirectoryResult<()> {
        if matches!(self.credentials, GoogleCredentials::ServiceAccount(_))
            && self.admin_email.trim().is_empty()
        {
            return Err(DirectoryError::Config(
                "An admin email is required for domain-wide delegation".into(),
            ));
        }
        url::Url::parse(&self.base_url)?;
        if self.page_size == 0 {
            return Err(DirectoryError::Config("Page size must be positive".into()));
        }
        Ok(())
    }
}
