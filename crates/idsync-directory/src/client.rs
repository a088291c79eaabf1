//! Admin SDK Directory API HTTP client.
//!
//! Every method issues exactly one request and returns one page; pagination
//! and retries are driven by the caller.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use idsync_core::{
    DirectoryMember, DirectorySource, DirectorySourceGroup, DirectorySourceUser, Page,
};

use crate::config::DirectoryConfig;
use crate::{DirectoryError, DirectoryResult, TokenCache};

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUserName {
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUser {
    id: String,
    #[serde(default)]
    primary_email: String,
    #[serde(default)]
    name: GoogleUserName,
    #[serde(default)]
    suspended: bool,
}

impl From<GoogleUser> for DirectorySourceUser {
    fn from(user: GoogleUser) -> Self {
        Self {
            id: user.id,
            primary_email: user.primary_email,
            given_name: user.name.given_name,
            family_name: user.name.family_name,
            suspended: user.suspended,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleGroup {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

impl From<GoogleGroup> for DirectorySourceGroup {
    fn from(group: GoogleGroup) -> Self {
        Self {
            id: group.id,
            name: group.name,
            email: group.email,
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersResponse {
    #[serde(default)]
    users: Vec<GoogleUser>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupsResponse {
    #[serde(default)]
    groups: Vec<GoogleGroup>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembersResponse {
    #[serde(default)]
    members: Vec<DirectoryMember>,
    next_page_token: Option<String>,
}

/// `*` matches everything and is sent as no query at all.
fn effective_query(query: Option<&str>) -> Option<&str> {
    query.map(str::trim).filter(|q| !q.is_empty() && *q != "*")
}

/// Empty page tokens are treated as the end of the listing.
fn next_token(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

/// Google Workspace Directory API client.
#[derive(Debug)]
pub struct GoogleDirectoryClient {
    http_client: reqwest::Client,
    token_cache: Arc<TokenCache>,
    base_url: String,
    customer: String,
    page_size: u32,
}

impl GoogleDirectoryClient {
    /// Creates a new directory client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: DirectoryConfig) -> DirectoryResult<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DirectoryError::Config(format!("Failed to create HTTP client: {e}")))?;

        let token_cache = Arc::new(TokenCache::new(
            config.credentials,
            config.admin_email,
            http_client.clone(),
        ));

        Ok(Self {
            http_client,
            token_cache,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            customer: config.customer,
            page_size: config.page_size,
        })
    }

    /// Returns the base URL for Directory API requests.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> DirectoryResult<url::Url> {
        Ok(url::Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    /// Performs one authenticated GET and decodes the body.
    async fn get_json<T: DeserializeOwned>(&self, url: url::Url) -> DirectoryResult<T> {
        let token = self.token_cache.get_token().await?;
        let response = self
            .http_client
            .get(url.clone())
            .bearer_auth(&token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            warn!(path = url.path(), ?retry_after_secs, "Directory API rate limited");
            return Err(DirectoryError::RateLimited { retry_after_secs });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.token_cache.invalidate().await;
        }

        let body = response.text().await.unwrap_or_default();
        let (reason, message) = match serde_json::from_str::<GoogleErrorResponse>(&body) {
            Ok(parsed) => (
                parsed.error.errors.into_iter().find_map(|e| e.reason),
                parsed.error.message,
            ),
            Err(_) => (None, body),
        };

        Err(DirectoryError::Api {
            status: status.as_u16(),
            reason,
            message,
        })
    }

    fn list_url(
        &self,
        path: &str,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> DirectoryResult<url::Url> {
        let mut url = self.url(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("customer", &self.customer);
            pairs.append_pair("maxResults", &self.page_size.to_string());
            if let Some(q) = effective_query(query) {
                pairs.append_pair("query", q);
            }
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl DirectorySource for GoogleDirectoryClient {
    type Error = DirectoryError;

    #[instrument(skip(self))]
    async fn list_users(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> DirectoryResult<Page<DirectorySourceUser>> {
        let url = self.list_url("/users", query, page_token)?;
        let response: UsersResponse = self.get_json(url).await?;
        debug!(count = response.users.len(), "Fetched users page");
        Ok(Page {
            items: response.users.into_iter().map(Into::into).collect(),
            next: next_token(response.next_page_token),
        })
    }

    #[instrument(skip(self))]
    async fn get_user(&self, user_key: &str) -> DirectoryResult<Option<DirectorySourceUser>> {
        let mut url = self.url("/users/")?;
        url.path_segments_mut()
            .map_err(|()| DirectoryError::Config("Base URL cannot carry a path".into()))?
            .pop_if_empty()
            .push(user_key);

        match self.get_json::<GoogleUser>(url).await {
            Ok(user) => Ok(Some(user.into())),
            Err(DirectoryError::Api { status: 404, .. }) => {
                debug!(user_key, "User not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn list_groups(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> DirectoryResult<Page<DirectorySourceGroup>> {
        let url = self.list_url("/groups", query, page_token)?;
        let response: GroupsResponse = self.get_json(url).await?;
        debug!(count = response.groups.len(), "Fetched groups page");
        Ok(Page {
            items: response.groups.into_iter().map(Into::into).collect(),
            next: next_token(response.next_page_token),
        })
    }

    #[instrument(skip(self))]
    async fn list_group_members(
        &self,
        group_id: &str,
        page_token: Option<&str>,
    ) -> DirectoryResult<Page<DirectoryMember>> {
        let mut url = self.url("/groups/")?;
        url.path_segments_mut()
            .map_err(|()| DirectoryError::Config("Base URL cannot carry a path".into()))?
            .pop_if_empty()
            .push(group_id)
            .push("members");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("includeDerivedMembership", "true");
            pairs.append_pair("maxResults", &self.page_size.to_string());
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }

        let response: MembersResponse = self.get_json(url).await?;
        Ok(Page {
            items: response.members,
            next: next_token(response.next_page_token),
        })
    }
}
