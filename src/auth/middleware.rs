//! Authentication middleware that validates the bearer access token on protected routes.

use axum::{
    extract::{FromRequestParts, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::auth::{AuthError, TokenKeys, TokenKind};

/// Middleware function that checks for a valid bearer access token.
///
/// The user ID is placed into the request extensions and the request executed
/// normally if the token is valid. Otherwise a `401` is returned whose body
/// code is `TOKEN_EXPIRED` for an expired token and `UNAUTHORIZED` for a
/// missing or invalid one.
///
/// **Note**: Route handlers can use the function argument `Extension(user_id): Extension<UserID>` to receive the user ID.
pub async fn auth_guard(
    State(token_keys): State<TokenKeys>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let bearer =
        match TypedHeader::<Authorization<Bearer>>::from_request_parts(&mut parts, &()).await {
            Ok(TypedHeader(Authorization(bearer))) => bearer,
            Err(_) => return AuthError::MissingToken.into_response(),
        };

    let claims = match token_keys.verify(TokenKind::Access, bearer.token()) {
        Ok(claims) => claims,
        Err(error) => {
            tracing::debug!("rejected access token for {}: {error}", parts.uri.path());
            return AuthError::from(error).into_response();
        }
    };

    parts.extensions.insert(claims.user_id);

    next.run(Request::from_parts(parts, body)).await
}

#[cfg(test)]
mod auth_guard_tests {
    use axum::{Extension, Router, http::StatusCode, middleware, routing::get};
    use axum_test::TestServer;
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    use crate::{
        auth::{TokenKeys, TokenKind, auth_guard},
        user::UserID,
    };

    const TEST_PROTECTED_ROUTE: &str = "/api/protected";

    async fn test_handler(Extension(user_id): Extension<UserID>) -> String {
        user_id.to_string()
    }

    fn get_test_server() -> (TestServer, TokenKeys) {
        let keys = TokenKeys::new("access-secret", "refresh-secret");
        let app = Router::new()
            .route(TEST_PROTECTED_ROUTE, get(test_handler))
            .layer(middleware::from_fn_with_state(keys.clone(), auth_guard));

        (TestServer::new(app), keys)
    }

    #[tokio::test]
    async fn valid_token_passes_user_id_to_handler() {
        let (server, keys) = get_test_server();
        let token = keys.issue(TokenKind::Access, UserID::new(9)).unwrap();

        let response = server
            .get(TEST_PROTECTED_ROUTE)
            .authorization_bearer(token)
            .await;

        response.assert_status_ok();
        response.assert_text("9");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (server, _) = get_test_server();

        let response = server.get(TEST_PROTECTED_ROUTE).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&json!({
            "code": "UNAUTHORIZED",
            "message": "Missing or invalid token",
        }));
    }

    #[tokio::test]
    async fn expired_token_reports_token_expired() {
        let (server, keys) = get_test_server();
        let issued_at = OffsetDateTime::now_utc() - Duration::minutes(16);
        let token = keys
            .issue_at(TokenKind::Access, UserID::new(9), issued_at)
            .unwrap();

        let response = server
            .get(TEST_PROTECTED_ROUTE)
            .authorization_bearer(token)
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&json!({
            "code": "TOKEN_EXPIRED",
            "message": "Access token expired",
        }));
    }

    #[tokio::test]
    async fn refresh_token_is_not_accepted() {
        let (server, keys) = get_test_server();
        let token = keys.issue(TokenKind::Refresh, UserID::new(9)).unwrap();

        let response = server
            .get(TEST_PROTECTED_ROUTE)
            .authorization_bearer(token)
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&json!({ "code": "UNAUTHORIZED", "message": "Invalid token" }));
    }
}
