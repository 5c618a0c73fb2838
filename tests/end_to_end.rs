//! Runs the real server on a local port and drives it with the real client.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use reqwest::StatusCode;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};
use tokio::net::TcpListener;
use wallet_rs::{
    AccountRequest, AppState, BudgetRequest, TokenKeys, TokenKind, UserProfile, build_router,
    client::{ApiClient, ClientError, MemoryStorage, RefreshError, TokenStore},
};

const ACCESS_SECRET: &str = "e2e-access-secret";
const REFRESH_SECRET: &str = "e2e-refresh-secret";
const PASSWORD: &str = "averysafeandsecurepassword";

struct TestApp {
    client: ApiClient,
    store: Arc<TokenStore>,
    redirects: Arc<AtomicUsize>,
}

async fn spawn_app() -> TestApp {
    let state = AppState::new(
        Connection::open_in_memory().unwrap(),
        ACCESS_SECRET,
        REFRESH_SECRET,
    )
    .unwrap()
    .with_password_cost(4);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    let store = Arc::new(TokenStore::load(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryStorage::new()),
    ));
    let redirects = Arc::new(AtomicUsize::new(0));
    let redirect_count = redirects.clone();

    let client = ApiClient::builder()
        .base_url(format!("http://{address}"))
        .token_store(store.clone())
        .on_login_required(move || {
            redirect_count.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    TestApp {
        client,
        store,
        redirects,
    }
}

/// An access token for `user` that expired a minute ago.
fn expired_access_token(user: &UserProfile) -> String {
    TokenKeys::new(ACCESS_SECRET, REFRESH_SECRET)
        .issue_at(
            TokenKind::Access,
            user.id,
            OffsetDateTime::now_utc() - Duration::minutes(16),
        )
        .unwrap()
}

#[tokio::test]
async fn register_and_manage_accounts() {
    let app = spawn_app().await;

    let user = app
        .client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();
    let account = app
        .client
        .create_account(&AccountRequest {
            name: Some("Wallet".to_owned()),
            kind: None,
        })
        .await
        .unwrap();

    assert_eq!(user.username, "alice");
    assert_eq!(app.store.user(), Some(user));
    assert_eq!(account.kind, "cash");
    assert_eq!(app.client.accounts().await.unwrap(), vec![account]);
}

#[tokio::test]
async fn expired_access_token_is_refreshed_transparently() {
    let app = spawn_app().await;
    let user = app
        .client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();
    let expired_token = expired_access_token(&user);
    app.store.set_access_token(&expired_token).unwrap();

    let budget = BudgetRequest {
        month: Some("2024-05".to_owned()),
        amount: Some(500.0),
        category: None,
    };

    let (a, b, c) = tokio::join!(
        app.client.accounts(),
        app.client.budgets(None),
        app.client.set_budget(&budget),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok(), "{a:?} {b:?} {c:?}");
    let access_token = app.store.access_token().unwrap();
    assert_ne!(access_token, expired_token);
    assert_eq!(app.redirects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_refresh_token_ends_session() {
    let app = spawn_app().await;
    let user = app
        .client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();
    app.store
        .set_tokens(&expired_access_token(&user), "not-a-refresh-token", user)
        .unwrap();

    let result = app.client.accounts().await;

    assert!(
        matches!(
            result,
            Err(ClientError::Refresh(RefreshError::Rejected {
                status: StatusCode::UNAUTHORIZED,
                ..
            }))
        ),
        "got {result:?}"
    );
    assert!(!app.store.is_logged_in());
    assert_eq!(app.store.refresh_token(), None);
    assert_eq!(app.redirects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forgot_password_then_log_in_with_new_password() {
    let app = spawn_app().await;
    app.client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();
    app.client.logout().unwrap();

    app.client
        .forgot_password("alice", "alice@example.com", "anothersafeandsecurepassword")
        .await
        .unwrap();

    let old_password = app.client.login("alice", PASSWORD).await;
    assert!(matches!(
        old_password,
        Err(ClientError::Status { status: StatusCode::UNAUTHORIZED, .. })
    ));

    let user = app
        .client
        .login("alice@example.com", "anothersafeandsecurepassword")
        .await
        .unwrap();
    assert_eq!(user.username, "alice");
}

#[tokio::test]
async fn profile_update_changes_stored_user() {
    let app = spawn_app().await;
    app.client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();

    app.client
        .update_profile("alicia", "alicia@example.com")
        .await
        .unwrap();

    let user = app.store.user().unwrap();
    assert_eq!(user.username, "alicia");
    assert_eq!(user.email, "alicia@example.com");
}

#[tokio::test]
async fn protected_call_without_session_asks_for_login() {
    let app = spawn_app().await;

    let result = app.client.accounts().await;

    assert!(matches!(result, Err(ClientError::SessionExpired(_))));
    assert_eq!(app.redirects.load(Ordering::SeqCst), 1);
}
