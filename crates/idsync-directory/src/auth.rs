//! `OAuth2` authentication for the Directory API.
//!
//! Service accounts sign an RS256 assertion that impersonates the workspace
//! admin and exchange it for a short-lived access token (JWT bearer grant).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::config::{GoogleCredentials, ServiceAccountKey, DIRECTORY_SCOPES};
use crate::{DirectoryError, DirectoryResult};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime accepted by Google (at most one hour).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Claims of the service-account assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    value: String,
    valid_until: DateTime<Utc>,
}

impl IssuedToken {
    /// Still usable for at least `margin` from now.
    fn fresh_for(&self, margin: Duration) -> bool {
        self.valid_until - margin > Utc::now()
    }
}

/// Hands out Directory API bearer tokens, exchanging a new assertion only
/// when the cached token is close to expiry.
#[derive(Debug)]
pub struct TokenCache {
    credentials: GoogleCredentials,
    admin_email: String,
    http: reqwest::Client,
    current: RwLock<Option<IssuedToken>>,
    refresh_margin: Duration,
}

impl TokenCache {
    pub fn new(credentials: GoogleCredentials, admin_email: String, http: reqwest::Client) -> Self {
        Self {
            credentials,
            admin_email,
            http,
            current: RwLock::new(None),
            refresh_margin: Duration::minutes(5),
        }
    }

    /// Bearer token for the next request.
    #[instrument(skip(self), fields(admin = %self.admin_email))]
    pub async fn get_token(&self) -> DirectoryResult<String> {
        let key = match &self.credentials {
            GoogleCredentials::AccessToken(token) => return Ok(token.expose_secret().to_string()),
            GoogleCredentials::ServiceAccount(key) => key,
        };

        if let Some(token) = self.current.read().await.as_ref() {
            if token.fresh_for(self.refresh_margin) {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.current.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref() {
            if token.fresh_for(self.refresh_margin) {
                return Ok(token.value.clone());
            }
        }
        let issued = self.exchange(key).await?;
        let value = issued.value.clone();
        *slot = Some(issued);
        Ok(value)
    }

    /// Signs the delegation assertion for the configured admin.
    fn sign_assertion(&self, key: &ServiceAccountKey, now: DateTime<Utc>) -> DirectoryResult<String> {
        let claims = AssertionClaims {
            iss: &key.client_email,
            sub: &self.admin_email,
            scope: DIRECTORY_SCOPES.join(" "),
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
            .map_err(|e| DirectoryError::Config(format!("Invalid service account key: {e}")))?;

        Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
    }

    /// Trade a signed assertion for an access token.
    #[instrument(skip(self, key), fields(client_email = %key.client_email))]
    async fn exchange(&self, key: &ServiceAccountKey) -> DirectoryResult<IssuedToken> {
        let assertion = self.sign_assertion(key, Utc::now())?;
        let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];

        let response = self.http.post(&key.token_uri).form(&form).send().await?;
        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DirectoryError::Api {
                status: status.as_u16(),
                reason: None,
                message: "Token endpoint unavailable".into(),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Auth(format!(
                "token exchange rejected ({status}): {detail}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Auth(format!("unreadable token response: {e}")))?;
        let valid_until = Utc::now() + Duration::seconds(body.expires_in);
        debug!(%valid_until, "Directory token issued");

        Ok(IssuedToken {
            value: body.access_token,
            valid_until,
        })
    }

    /// Drop the cached token so the next call exchanges a new one.
    pub async fn invalidate(&self) {
        self.current.write().await.take();
    }
}
