//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::{
    AppState,
    account::{
        create_account_endpoint, delete_account_endpoint, get_accounts_endpoint,
        update_account_endpoint,
    },
    auth::{
        auth_guard, post_forgot_password, post_log_in, post_refresh, post_register, put_profile,
    },
    budget::{delete_budget_endpoint, get_budgets_endpoint, upsert_budget_endpoint},
    endpoints,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::REGISTER, post(post_register))
        .route(endpoints::LOG_IN, post(post_log_in))
        .route(endpoints::REFRESH, post(post_refresh))
        .route(endpoints::FORGOT_PASSWORD, post(post_forgot_password));

    let protected_routes = Router::new()
        .route(endpoints::PROFILE, put(put_profile))
        .route(
            endpoints::ACCOUNTS,
            get(get_accounts_endpoint).post(create_account_endpoint),
        )
        .route(
            endpoints::ACCOUNT,
            put(update_account_endpoint).delete(delete_account_endpoint),
        )
        .route(
            endpoints::BUDGETS,
            get(get_budgets_endpoint).post(upsert_budget_endpoint),
        )
        .route(
            endpoints::BUDGET,
            axum::routing::delete(delete_budget_endpoint),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

#[cfg(test)]
mod routing_tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::{Value, json};

    use crate::{AppState, auth::AuthResponse, endpoints, routing::build_router};

    fn get_test_server() -> TestServer {
        let connection = Connection::open_in_memory().unwrap();
        let state = AppState::new(connection, "access-secret", "refresh-secret")
            .unwrap()
            .with_password_cost(4);

        TestServer::new(build_router(state))
    }

    async fn register(server: &TestServer) -> AuthResponse {
        server
            .post(endpoints::REGISTER)
            .json(&json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "averysafeandsecurepassword",
            }))
            .await
            .json::<AuthResponse>()
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let server = get_test_server();

        for path in [endpoints::ACCOUNTS, endpoints::BUDGETS] {
            let response = server.get(path).await;

            response.assert_status(StatusCode::UNAUTHORIZED);
            assert_eq!(response.json::<Value>()["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let server = get_test_server();

        let response = server.get("/api/nope").await;

        response.assert_status_not_found();
        response.assert_json(&json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn registered_user_can_manage_accounts() {
        let server = get_test_server();
        let auth = register(&server).await;

        server
            .post(endpoints::ACCOUNTS)
            .authorization_bearer(&auth.access_token)
            .json(&json!({ "name": "Wallet", "type": "cash" }))
            .await
            .assert_status_ok();

        let accounts = server
            .get(endpoints::ACCOUNTS)
            .authorization_bearer(&auth.access_token)
            .await
            .json::<Value>();

        assert_eq!(accounts[0]["name"], "Wallet");
        assert_eq!(accounts[0]["type"], "cash");
        assert_eq!(accounts[0]["balance"], 0.0);
    }

    #[tokio::test]
    async fn budgets_filter_by_month() {
        let server = get_test_server();
        let auth = register(&server).await;

        for month in ["2024-01", "2024-02"] {
            server
                .post(endpoints::BUDGETS)
                .authorization_bearer(&auth.access_token)
                .json(&json!({ "month": month, "amount": 100.0 }))
                .await
                .assert_json(&json!({ "success": true }));
        }

        let budgets = server
            .get(endpoints::BUDGETS)
            .add_query_param("month", "2024-02")
            .authorization_bearer(&auth.access_token)
            .await
            .json::<Value>();

        assert_eq!(budgets.as_array().map(Vec::len), Some(1));
        assert_eq!(budgets[0]["month"], "2024-02");
    }

    #[tokio::test]
    async fn invalid_month_is_bad_request() {
        let server = get_test_server();
        let auth = register(&server).await;

        server
            .post(endpoints::BUDGETS)
            .authorization_bearer(&auth.access_token)
            .json(&json!({ "month": "2024-13", "amount": 100.0 }))
            .await
            .assert_status_bad_request();
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let server = get_test_server();
        let auth = register(&server).await;

        server
            .get(endpoints::ACCOUNTS)
            .authorization_bearer(&auth.refresh_token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
