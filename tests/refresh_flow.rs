//! Integration tests for the token refresh flow of the wallet API client

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use reqwest::StatusCode;
use serde_json::json;
use wallet_rs::client::{
    ApiClient, ApiRequest, ClientError, FileStorage, MemoryStorage, RefreshError, Session,
    Storage, TokenStore, REFRESH_TOKEN_KEY,
};
use wallet_rs::{UserID, UserProfile};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn alice() -> UserProfile {
    UserProfile {
        id: UserID::new(1),
        username: "alice".to_owned(),
        email: "alice@example.com".to_owned(),
    }
}

fn expired() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "code": "TOKEN_EXPIRED",
        "message": "Access token expired",
    }))
}

fn logged_in_store() -> Arc<TokenStore> {
    let store = TokenStore::load(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryStorage::new()),
    );
    store.set_tokens("T1", "R1", alice()).unwrap();
    Arc::new(store)
}

fn client(server: &MockServer, store: Arc<TokenStore>, redirects: Arc<AtomicUsize>) -> ApiClient {
    ApiClient::builder()
        .base_url(server.uri())
        .token_store(store)
        .on_login_required(move || {
            redirects.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn concurrent_expired_calls_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(expired())
        .expect(5)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(5)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "R1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "T2", "expiresIn": 900 }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let client = client(&server, store.clone(), Arc::new(AtomicUsize::new(0)));

    let (a, b, c, d, e) = tokio::join!(
        client.accounts(),
        client.accounts(),
        client.accounts(),
        client.accounts(),
        client.accounts(),
    );

    for result in [a, b, c, d, e] {
        assert_eq!(result.unwrap(), vec![]);
    }
    assert_eq!(store.access_token().as_deref(), Some("T2"));
}

#[tokio::test]
async fn rejected_refresh_ends_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(expired())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "error": "Invalid or expired refresh token" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let redirects = Arc::new(AtomicUsize::new(0));
    let client = client(&server, store.clone(), redirects.clone());

    let result = client.accounts().await;

    match result {
        Err(ClientError::Refresh(RefreshError::Rejected { status, message })) => {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(message, "Invalid or expired refresh token");
        }
        other => panic!("expected the refresh error, got {other:?}"),
    }
    assert_eq!(store.session(), Session::default());
    assert_eq!(store.refresh_token(), None);
    assert_eq!(redirects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn call_expired_after_refresh_is_not_retried_again() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(expired())
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "T2", "expiresIn": 900 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, logged_in_store(), Arc::new(AtomicUsize::new(0)));

    let result = client.accounts().await;

    assert!(
        matches!(result, Err(ClientError::SessionExpired(ref message)) if message == "Access token expired"),
        "got {result:?}"
    );
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "error": "Internal server error" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server, logged_in_store(), Arc::new(AtomicUsize::new(0)));

    let result = client.accounts().await;

    assert!(matches!(
        result,
        Err(ClientError::Status { status: StatusCode::INTERNAL_SERVER_ERROR, .. })
    ));
}

#[tokio::test]
async fn new_process_refreshes_with_durable_token() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.json");
    FileStorage::new(&session_file)
        .set(REFRESH_TOKEN_KEY, "R1")
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/budgets"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/budgets"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "UNAUTHORIZED",
            "message": "Missing or invalid token",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "R1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "T2", "expiresIn": 900 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(TokenStore::load(
        Arc::new(MemoryStorage::new()),
        Arc::new(FileStorage::new(&session_file)),
    ));
    assert_eq!(store.session().access_token, None);
    let client = client(&server, store.clone(), Arc::new(AtomicUsize::new(0)));

    let budgets = client.budgets(None).await.unwrap();

    assert!(budgets.is_empty());
    assert_eq!(store.access_token().as_deref(), Some("T2"));
    assert_eq!(store.refresh_token().as_deref(), Some("R1"));
}

#[tokio::test]
async fn login_stores_tokens_without_sending_one() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({
            "email": null,
            "username": "alice",
            "password": "averysafeandsecurepassword",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "user": { "id": 1, "username": "alice", "email": "alice@example.com" },
            "accessToken": "T1",
            "refreshToken": "R1",
            "expiresIn": 900,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let durable_storage = Arc::new(MemoryStorage::new());
    let store = Arc::new(TokenStore::load(
        Arc::new(MemoryStorage::new()),
        durable_storage.clone(),
    ));
    let client = client(&server, store.clone(), Arc::new(AtomicUsize::new(0)));

    let user = client
        .login("alice", "averysafeandsecurepassword")
        .await
        .unwrap();

    assert_eq!(user, alice());
    assert!(store.is_logged_in());
    assert_eq!(
        durable_storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("R1")
    );
}

#[tokio::test]
async fn wrong_password_is_not_treated_as_expired_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid email or password" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let redirects = Arc::new(AtomicUsize::new(0));
    let store = logged_in_store();
    let client = client(&server, store.clone(), redirects.clone());

    let result = client.login("alice@example.com", "wrong").await;

    assert!(matches!(
        result,
        Err(ClientError::Status { status: StatusCode::UNAUTHORIZED, ref message, .. })
            if message == "Invalid email or password"
    ));
    assert_eq!(redirects.load(Ordering::SeqCst), 0);
    assert!(store.is_logged_in());
}

#[test]
fn builder_rejects_invalid_base_url() {
    let result = ApiClient::builder().base_url("localhost:3000").build();

    assert!(matches!(result, Err(ClientError::Configuration(_))));
}
