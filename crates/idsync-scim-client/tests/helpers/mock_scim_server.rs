//! wiremock stand-in for the identity store's SCIM endpoint.

#![allow(dead_code)]

use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{any, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use idsync_scim_client::{MembershipPatchMode, ScimAuth, ScimClient};

pub const TEST_TOKEN: &str = "test-token-123";

const SCIM_JSON: &str = "application/scim+json";

pub struct MockScimServer {
    pub server: MockServer,
}

impl MockScimServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn client(&self) -> ScimClient {
        ScimClient::with_http_client(
            self.server.uri(),
            ScimAuth::bearer(TEST_TOKEN),
            reqwest::Client::new(),
        )
    }

    pub fn client_with_mode(&self, mode: MembershipPatchMode) -> ScimClient {
        self.client().with_membership_mode(mode)
    }

    /// Requests seen so far for one method and path.
    pub async fn requests_to(&self, http_method: &str, request_path: &str) -> Vec<Request> {
        let seen = self.server.received_requests().await.unwrap_or_default();
        seen.into_iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
            .collect()
    }

    async fn mount(&self, mock: Mock) {
        mock.mount(&self.server).await;
    }

    /// POST /Users echoes the body back with a fresh id and meta block.
    pub async fn mock_create_user_success(&self) {
        let bearer = format!("Bearer {TEST_TOKEN}");
        self.mount(
            Mock::given(method("POST"))
                .and(path("/Users"))
                .and(header("Content-Type", SCIM_JSON))
                .and(header("Authorization", bearer.as_str()))
                .respond_with(|req: &Request| {
                    let mut created = assign_id(req);
                    created["meta"] = json!({
                        "resourceType": "User",
                        "created": "2024-03-01T12:00:00Z",
                        "lastModified": "2024-03-01T12:00:00Z"
                    });
                    ResponseTemplate::new(201).set_body_json(created)
                }),
        )
        .await;
    }

    pub async fn mock_create_user_conflict(&self) {
        self.mount(
            Mock::given(method("POST"))
                .and(path("/Users"))
                .respond_with(
                    ResponseTemplate::new(409).set_body_json(scim_error(409, "Duplicate userName")),
                ),
        )
        .await;
    }

    pub async fn mock_replace_user_success(&self, user_id: &str) {
        self.mount(
            Mock::given(method("PUT"))
                .and(path(format!("/Users/{user_id}")))
                .and(header("Content-Type", SCIM_JSON))
                .respond_with(|req: &Request| {
                    ResponseTemplate::new(200).set_body_json(request_json(req))
                }),
        )
        .await;
    }

    pub async fn mock_patch_user_no_content(&self, user_id: &str) {
        self.mount(
            Mock::given(method("PATCH"))
                .and(path(format!("/Users/{user_id}")))
                .respond_with(ResponseTemplate::new(204)),
        )
        .await;
    }

    /// One page of GET /Users, matched on `startIndex`.
    pub async fn mock_list_users_page(&self, users: Vec<Value>, total: i64, start_index: i64) {
        let page = list_response(users, total, start_index);
        self.mount(
            Mock::given(method("GET"))
                .and(path("/Users"))
                .and(query_param("startIndex", start_index.to_string().as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(page)),
        )
        .await;
    }

    pub async fn mock_list_groups(&self, groups: Vec<Value>) {
        let total = groups.len() as i64;
        self.mount(
            Mock::given(method("GET"))
                .and(path("/Groups"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(list_response(groups, total, 1)),
                ),
        )
        .await;
    }

    pub async fn mock_get_group(&self, group: Value) {
        let group_path = format!("/Groups/{}", group["id"].as_str().unwrap_or_default());
        self.mount(
            Mock::given(method("GET"))
                .and(path(group_path))
                .respond_with(ResponseTemplate::new(200).set_body_json(group)),
        )
        .await;
    }

    pub async fn mock_create_group_success(&self) {
        self.mount(
            Mock::given(method("POST"))
                .and(path("/Groups"))
                .respond_with(|req: &Request| ResponseTemplate::new(201).set_body_json(assign_id(req))),
        )
        .await;
    }

    pub async fn mock_patch_group_no_content(&self, group_id: &str) {
        self.mount(
            Mock::given(method("PATCH"))
                .and(path(format!("/Groups/{group_id}")))
                .and(header("Content-Type", SCIM_JSON))
                .respond_with(ResponseTemplate::new(204)),
        )
        .await;
    }

    pub async fn mock_delete_group_success(&self, group_id: &str) {
        self.mount(
            Mock::given(method("DELETE"))
                .and(path(format!("/Groups/{group_id}")))
                .respond_with(ResponseTemplate::new(204)),
        )
        .await;
    }

    pub async fn mock_unauthorized(&self) {
        self.mock_status_with_detail(401, "Invalid bearer token").await;
    }

    /// 429 on every request, advertising `Retry-After`.
    pub async fn mock_rate_limited(&self, retry_after_secs: u64) {
        self.mount(
            Mock::given(any()).respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", retry_after_secs.to_string().as_str())
                    .set_body_json(scim_error(429, "Too many requests")),
            ),
        )
        .await;
    }

    /// `status` on every request.
    pub async fn mock_status(&self, status: u16) {
        self.mock_status_with_detail(status, "Request failed").await;
    }

    async fn mock_status_with_detail(&self, status: u16, detail: &str) {
        self.mount(
            Mock::given(any())
                .respond_with(ResponseTemplate::new(status).set_body_json(scim_error(status, detail))),
        )
        .await;
    }
}

fn request_json(req: &Request) -> Value {
    serde_json::from_slice(&req.body).unwrap_or_else(|_| json!({}))
}

fn assign_id(req: &Request) -> Value {
    let mut body = request_json(req);
    body["id"] = json!(Uuid::new_v4().to_string());
    body
}

/// RFC 7644 §3.12 error body.
pub fn scim_error(status: u16, detail: &str) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:Error"],
        "status": status.to_string(),
        "detail": detail
    })
}

pub fn list_response(resources: Vec<Value>, total: i64, start_index: i64) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:ListResponse"],
        "totalResults": total,
        "startIndex": start_index,
        "itemsPerPage": resources.len(),
        "Resources": resources
    })
}

/// Store-side user as the identity store returns it.
pub fn scim_user(id: &str, external_id: Option<&str>, email: &str, active: bool) -> Value {
    let mut user = json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "id": id,
        "userName": email,
        "name": { "givenName": "Test", "familyName": "User" },
        "displayName": "Test User",
        "emails": [{ "value": email, "type": "work", "primary": true }],
        "active": active,
        "meta": { "resourceType": "User" }
    });
    if let Some(external_id) = external_id {
        user["externalId"] = json!(external_id);
    }
    user
}

pub fn scim_group(id: &str, external_id: Option<&str>, name: &str, members: &[&str]) -> Value {
    let members: Vec<Value> = members.iter().map(|id| json!({ "value": id })).collect();
    let mut group = json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:Group"],
        "id": id,
        "displayName": name,
        "members": members,
        "meta": { "resourceType": "Group" }
    });
    if let Some(external_id) = external_id {
        group["externalId"] = json!(external_id);
    }
    group
}
