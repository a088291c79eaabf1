//! Common test utilities for idsync-directory integration tests.

#![allow(dead_code)]

use idsync_directory::{DirectoryConfig, GoogleCredentials, GoogleDirectoryClient};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Throwaway RSA key used to sign test assertions.
pub const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/test_service_account.pem");

/// API prefix served by the mock server.
pub const API_PREFIX: &str = "/admin/directory/v1";

/// Test data factory for Directory API users.
pub fn create_test_user(id: &str, email: &str, given: &str, family: &str) -> Value {
    json!({
        "kind": "admin#directory#user",
        "id": id,
        "primaryEmail": email,
        "name": {
            "givenName": given,
            "familyName": family,
            "fullName": format!("{given} {family}")
        },
        "suspended": false,
        "isAdmin": false
    })
}

/// Test data factory for suspended Directory API users.
pub fn create_suspended_user(id: &str, email: &str) -> Value {
    let mut user = create_test_user(id, email, "Gone", "Away");
    user["suspended"] = json!(true);
    user
}

/// Test data factory for Directory API groups.
pub fn create_test_group(id: &str, name: &str, email: &str) -> Value {
    json!({
        "kind": "admin#directory#group",
        "id": id,
        "name": name,
        "email": email,
        "directMembersCount": "0"
    })
}

/// Test data factory for group members.
pub fn create_member(id: &str, email: &str, kind: &str) -> Value {
    json!({
        "kind": "admin#directory#member",
        "id": id,
        "email": email,
        "role": "MEMBER",
        "type": kind,
        "status": "ACTIVE"
    })
}

/// Google API error body.
pub fn create_google_error(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
            "errors": [{ "domain": "global", "reason": reason, "message": message }]
        }
    })
}

/// Service-account key document pointing at the mock token endpoint.
pub fn service_account_json(token_uri: &str) -> String {
    json!({
        "type": "service_account",
        "project_id": "idsync-test",
        "private_key_id": "test-key-1",
        "private_key": TEST_PRIVATE_KEY,
        "client_email": "idsync@idsync-test.iam.gserviceaccount.com",
        "client_id": "109876543210",
        "token_uri": token_uri
    })
    .to_string()
}

/// Mock Directory API server.
pub struct MockDirectoryServer {
    pub server: MockServer,
}

impl MockDirectoryServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL for the client configuration.
    pub fn base_url(&self) -> String {
        format!("{}{}", self.server.uri(), API_PREFIX)
    }

    /// Client authenticated with a static access token.
    pub fn client(&self) -> GoogleDirectoryClient {
        let config = DirectoryConfig::new(
            "admin@example.com",
            GoogleCredentials::access_token("static-token"),
        )
        .with_base_url(self.base_url())
        .with_page_size(2);
        GoogleDirectoryClient::new(config).unwrap()
    }

    /// Sets up the `OAuth2` token endpoint.
    pub async fn mock_token_endpoint(&self, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&self.server)
            .await;
    }
}
