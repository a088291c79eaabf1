//! [`IdentityStore`] over the identity store's SCIM 2.0 endpoint (RFC 7644).
//!
//! One call is one HTTP request. Retries belong to the caller.

use crate::auth::ScimAuth;
use crate::error::{ScimClientError, ScimClientResult};
use crate::models::{MembershipPatchMode, ScimGroup, ScimListResponse, ScimPatchRequest};
use async_trait::async_trait;
use idsync_core::{IdentityStore, MembershipChange, Page, ProvisionedGroup, ProvisionedUser};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const SCIM_CONTENT_TYPE: &str = "application/scim+json";

/// Default page size for list calls.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// SCIM 2.0 HTTP client for the provisioned identity store.
#[derive(Debug, Clone)]
pub struct ScimClient {
    /// Base URL of the SCIM endpoint (e.g., "<https://scim.us-east-1.amazonaws.com/abc/scim/v2>").
    base_url: String,
    auth: ScimAuth,
    http_client: Client,
    page_size: u32,
    membership_mode: MembershipPatchMode,
}

impl ScimClient {
    /// Client with its own HTTP connection pool and request timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the endpoint or token is blank, or the HTTP
    /// client cannot be built.
    pub fn new(base_url: String, auth: ScimAuth, timeout: Duration) -> ScimClientResult<Self> {
        if base_url.trim().is_empty() {
            return Err(ScimClientError::InvalidConfig(
                "SCIM endpoint must not be empty".into(),
            ));
        }
        if auth.is_empty() {
            return Err(ScimClientError::InvalidConfig(
                "SCIM access token must not be empty".into(),
            ));
        }

        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("idsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ScimClientError::InvalidConfig(format!("HTTP client setup failed: {e}"))
            })?;

        Ok(Self::with_http_client(base_url, auth, http_client))
    }

    /// Client over a caller-supplied `reqwest::Client`.
    #[must_use]
    pub fn with_http_client(base_url: String, auth: ScimAuth, http_client: Client) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            auth,
            http_client,
            page_size: DEFAULT_PAGE_SIZE,
            membership_mode: MembershipPatchMode::default(),
        }
    }

    /// Set the membership PATCH strategy.
    #[must_use]
    pub fn with_membership_mode(mut self, mode: MembershipPatchMode) -> Self {
        self.membership_mode = mode;
        self
    }

    /// Set the page size for list calls.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn membership_mode(&self) -> MembershipPatchMode {
        self.membership_mode
    }

    fn resource_url(&self, resource: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{resource}/{id}", self.base_url),
            None => format!("{}/{resource}", self.base_url),
        }
    }

    async fn list_page<T: DeserializeOwned>(
        &self,
        resource: &str,
        cursor: Option<&str>,
    ) -> ScimClientResult<(Vec<T>, Option<String>)> {
        let start_index: i64 = match cursor {
            None => 1,
            Some(raw) => raw.parse().map_err(|_| {
                ScimClientError::InvalidConfig(format!("Invalid page cursor '{raw}'"))
            })?,
        };

        let request = self
            .http_client
            .get(self.resource_url(resource, None))
            .query(&[("startIndex", start_index), ("count", i64::from(self.page_size))]);
        let response = self.send(request, resource).await?;
        let page: ScimListResponse<T> = read_json(response).await?;

        let next = page.next_start_index().map(|i| i.to_string());
        Ok((page.resources, next))
    }

    /// Authenticate and send; any non-2xx status becomes an error.
    async fn send(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> ScimClientResult<reqwest::Response> {
        let response = self.auth.apply(request).send().await?;
        let status = response.status();
        debug!(%status, request = what, "SCIM response");
        if status.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn send_json<B: Serialize>(
        &self,
        method: Method,
        url: String,
        body: &B,
    ) -> ScimClientResult<reqwest::Response> {
        let label = format!("{method} {url}");
        let request = self
            .http_client
            .request(method, url)
            .header("Content-Type", SCIM_CONTENT_TYPE)
            .json(body);
        self.send(request, &label).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> ScimClientResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ScimClientError::ParseError(format!("unexpected SCIM payload: {e}")))
}

async fn error_from_response(response: reqwest::Response) -> ScimClientError {
    let status = response.status();
    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => ScimClientError::NotFound(body),
        StatusCode::CONFLICT => ScimClientError::Conflict(body),
        StatusCode::TOO_MANY_REQUESTS => {
            warn!(?retry_after_secs, "Identity store is throttling requests");
            ScimClientError::RateLimited { retry_after_secs }
        }
        StatusCode::UNAUTHORIZED => {
            ScimClientError::AuthError(format!("Authentication failed (401): {body}"))
        }
        _ => ScimClientError::ScimError {
            status: status.as_u16(),
            detail: if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            },
        },
    }
}

#[async_trait]
impl IdentityStore for ScimClient {
    type Error = ScimClientError;

    #[instrument(skip(self))]
    async fn list_users(&self, cursor: Option<&str>) -> ScimClientResult<Page<ProvisionedUser>> {
        let (items, next) = self.list_page::<ProvisionedUser>("Users", cursor).await?;
        Ok(Page { items, next })
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, cursor: Option<&str>) -> ScimClientResult<Page<ProvisionedGroup>> {
        let (items, next) = self.list_page::<ScimGroup>("Groups", cursor).await?;
        Ok(Page {
            items: items.into_iter().map(Into::into).collect(),
            next,
        })
    }

    #[instrument(skip(self))]
    async fn get_group_members(&self, group_id: &str) -> ScimClientResult<Vec<String>> {
        let request = self.http_client.get(self.resource_url("Groups", Some(group_id)));
        let group: ScimGroup = read_json(self.send(request, group_id).await?).await?;
        Ok(group.members.into_iter().map(|m| m.value).collect())
    }

    #[instrument(skip(self, user), fields(user_name = %user.user_name))]
    async fn create_user(&self, user: &ProvisionedUser) -> ScimClientResult<ProvisionedUser> {
        let url = self.resource_url("Users", None);
        read_json(self.send_json(Method::POST, url, user).await?).await
    }

    #[instrument(skip(self, user), fields(user_name = %user.user_name))]
    async fn replace_user(
        &self,
        id: &str,
        user: &ProvisionedUser,
    ) -> ScimClientResult<ProvisionedUser> {
        let body = ProvisionedUser {
            id: Some(id.to_string()),
            meta: None,
            ..user.clone()
        };
        let url = self.resource_url("Users", Some(id));
        read_json(self.send_json(Method::PUT, url, &body).await?).await
    }

    #[instrument(skip(self))]
    async fn deactivate_user(&self, id: &str) -> ScimClientResult<()> {
        let url = self.resource_url("Users", Some(id));
        self.send_json(Method::PATCH, url, &ScimPatchRequest::deactivate())
            .await?;
        Ok(())
    }

    #[instrument(skip(self, group), fields(display_name = %group.display_name))]
    async fn create_group(&self, group: &ProvisionedGroup) -> ScimClientResult<ProvisionedGroup> {
        let url = self.resource_url("Groups", None);
        let response = self
            .send_json(Method::POST, url, &ScimGroup::from(group))
            .await?;
        let created: ScimGroup = read_json(response).await?;
        Ok(created.into())
    }

    #[instrument(skip(self, group), fields(display_name = %group.display_name))]
    async fn update_group(&self, id: &str, group: &ProvisionedGroup) -> ScimClientResult<()> {
        let url = self.resource_url("Groups", Some(id));
        self.send_json(Method::PATCH, url, &ScimPatchRequest::group_attributes(group))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, change), fields(
        mode = %self.membership_mode,
        add = change.add.len(),
        remove = change.remove.len()
    ))]
    async fn patch_group_members(
        &self,
        group_id: &str,
        change: &MembershipChange,
    ) -> ScimClientResult<()> {
        let Some(patch) = ScimPatchRequest::membership(self.membership_mode, change) else {
            return Ok(());
        };
        let url = self.resource_url("Groups", Some(group_id));
        self.send_json(Method::PATCH, url, &patch).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_group(&self, id: &str) -> ScimClientResult<()> {
        let request = self.http_client.delete(self.resource_url("Groups", Some(id)));
        self.send(request, id).await?;
        Ok(())
    }
}
