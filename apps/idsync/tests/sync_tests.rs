//! Full runs through the real clients against a mock Google + SCIM server.

use clap::Parser;
use idsync::{runner, Cli, SyncConfig};
use idsync_core::SyncError;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TEST_PRIVATE_KEY: &str =
    include_str!("../../../crates/idsync-directory/tests/fixtures/test_service_account.pem");
const DIRECTORY: &str = "/admin/directory/v1";
const SCIM_TOKEN: &str = "scim-token-123";

fn service_account_json(token_uri: &str) -> String {
    json!({
        "type": "service_account",
        "private_key_id": "test-key-1",
        "private_key": TEST_PRIVATE_KEY,
        "client_email": "idsync@idsync-test.iam.gserviceaccount.com",
        "token_uri": token_uri
    })
    .to_string()
}

fn config(server: &MockServer, extra: &[&str]) -> SyncConfig {
    let uri = server.uri();
    let mut args = vec![
        "idsync".to_string(),
        "--google-admin".into(),
        "admin@example.com".into(),
        "--google-credentials".into(),
        service_account_json(&format!("{uri}/token")),
        "--google-api-url".into(),
        format!("{uri}{DIRECTORY}"),
        "--scim-endpoint".into(),
        format!("{uri}/scim"),
        "--scim-access-token".into(),
        SCIM_TOKEN.into(),
        "--max-retries".into(),
        "1".into(),
        "--retry-base-delay-ms".into(),
        "1".into(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    SyncConfig::from_cli(Cli::try_parse_from(args).unwrap()).unwrap()
}

async fn mock_google(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "google-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{DIRECTORY}/groups")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "groups": [{ "id": "g1", "name": "Admins", "email": "admins@example.com" }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{DIRECTORY}/groups/g1/members")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "members": [{
                "kind": "admin#directory#member",
                "id": "u1",
                "email": "lee@example.com",
                "type": "USER",
                "status": "ACTIVE"
            }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(format!("^{DIRECTORY}/users/lee(@|%40)example.com$")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "primaryEmail": "lee@example.com",
            "name": { "givenName": "Lee", "familyName": "Packham" },
            "suspended": false
        })))
        .mount(server)
        .await;
}

async fn mock_empty_scim(server: &MockServer) {
    for resource in ["Users", "Groups"] {
        Mock::given(method("GET"))
            .and(path(format!("/scim/{resource}")))
            .and(header("Authorization", format!("Bearer {SCIM_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schemas": ["urn:ietf:params:scim:api:messages:2.0:ListResponse"],
                "totalResults": 0,
                "startIndex": 1,
                "itemsPerPage": 0,
                "Resources": []
            })))
            .mount(server)
            .await;
    }
}

fn echo_with_id(id: &'static str) -> impl Fn(&Request) -> ResponseTemplate {
    move |req: &Request| {
        let mut body: Value = serde_json::from_slice(&req.body).unwrap_or(json!({}));
        body["id"] = json!(id);
        ResponseTemplate::new(201).set_body_json(body)
    }
}

#[tokio::test]
async fn test_groups_run_creates_user_group_and_membership() {
    let server = MockServer::start().await;
    mock_google(&server).await;
    mock_empty_scim(&server).await;

    Mock::given(method("POST"))
        .and(path("/scim/Users"))
        .respond_with(echo_with_id("scim-u1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scim/Groups"))
        .respond_with(echo_with_id("scim-g1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/scim/Groups/scim-g1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let summary = runner::run(&config(&server, &[])).await.unwrap();

    assert_eq!(summary.counts.users_created, 1);
    assert_eq!(summary.counts.groups_created, 1);
    assert_eq!(summary.counts.members_added, 1);
    assert!(runner::outcome(Ok(summary)).is_ok());

    let posts: Vec<Value> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/scim/Users")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(posts[0]["userName"], "lee@example.com");
    assert_eq!(posts[0]["displayName"], "Lee Packham");
    assert_eq!(posts[0]["externalId"], "u1");
    assert_eq!(posts[0]["active"], true);
}

#[tokio::test]
async fn test_dry_run_sends_no_writes() {
    let server = MockServer::start().await;
    mock_google(&server).await;
    mock_empty_scim(&server).await;

    Mock::given(method("POST"))
        .and(path_regex("^/scim/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path_regex("^/scim/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let summary = runner::run(&config(&server, &["--dry-run"])).await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.counts.changes(), 0);
    assert_eq!(summary.counts.skipped, 3);
}

#[tokio::test]
async fn test_scim_unauthorized_is_fatal() {
    let server = MockServer::start().await;
    mock_google(&server).await;

    Mock::given(method("GET"))
        .and(path_regex("^/scim/(Users|Groups)$"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:Error"],
            "status": "401",
            "detail": "Invalid bearer token"
        })))
        .mount(&server)
        .await;

    let result = runner::run(&config(&server, &[])).await;

    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, SyncError::Authentication { .. }));
    assert_eq!(runner::outcome(result).unwrap_err().exit_code(), 1);
}
