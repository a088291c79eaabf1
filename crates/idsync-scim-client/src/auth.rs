//! SCIM target authentication (static bearer token).

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Bearer-token authentication for the SCIM endpoint.
///
/// The [`Debug`] impl redacts the token.
#[derive(Clone)]
pub struct ScimAuth {
    token: Arc<SecretString>,
}

impl std::fmt::Debug for ScimAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScimAuth")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl ScimAuth {
    /// Create an auth handler from a bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(SecretString::from(token.into())),
        }
    }

    /// Whether the token is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.expose_secret().trim().is_empty()
    }

    /// Apply authentication to a request builder.
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.token.expose_secret())
    }
}
