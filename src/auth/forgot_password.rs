//! Resetting a forgotten password by proving the username and email belong together.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    Error, PasswordHash, ValidatedPassword,
    auth::{AuthState, SuccessResponse, non_empty},
    user::{get_user_id_by_username_and_email, update_password},
};

/// The body sent to the forgot password endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    /// The username of the account.
    pub username: Option<String>,
    /// The email of the account.
    pub email: Option<String>,
    /// The password to set.
    pub new_password: Option<String>,
}

/// Handler for setting a new password without logging in.
///
/// Existing tokens are not revoked.
pub async fn post_forgot_password(
    State(state): State<AuthState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Response {
    match reset_password(&state, &request) {
        Ok(()) => SuccessResponse::ok().into_response(),
        Err(error) => error.into_response(),
    }
}

fn reset_password(state: &AuthState, request: &ForgotPasswordRequest) -> Result<(), Error> {
    let username = non_empty(&request.username);
    let email = non_empty(&request.email);
    let new_password = request.new_password.as_deref().filter(|p| !p.is_empty());
    let (Some(username), Some(email), Some(new_password)) = (username, email, new_password) else {
        return Err(Error::MissingFields(
            "Username, email and new password are required",
        ));
    };

    let user_id = match get_user_id_by_username_and_email(username, email, &*state.connection()?) {
        Ok(user_id) => user_id,
        Err(Error::NotFound) => return Err(Error::UserMismatch),
        Err(error) => return Err(error),
    };

    let password = ValidatedPassword::new(new_password, &[username, email])?;
    let password_hash = PasswordHash::new(password, state.password_cost)?;
    update_password(user_id, &password_hash, &*state.connection()?)?;

    tracing::info!(%user_id, "password reset");

    Ok(())
}

#[cfg(test)]
mod forgot_password_tests {
    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use serde_json::json;

    use crate::{
        auth::{
            AuthState,
            forgot_password::post_forgot_password,
            test_utils::{get_test_auth_state, insert_test_user},
        },
        endpoints,
        user::get_user_by_id,
    };

    fn get_test_server() -> (TestServer, AuthState) {
        let state = get_test_auth_state();
        let app = Router::new()
            .route(endpoints::FORGOT_PASSWORD, post(post_forgot_password))
            .with_state(state.clone());

        (TestServer::new(app), state)
    }

    #[tokio::test]
    async fn matching_username_and_email_resets_password() {
        let (server, state) = get_test_server();
        let user = insert_test_user(&state, "carol", "carol@example.com");

        let response = server
            .post(endpoints::FORGOT_PASSWORD)
            .json(&json!({
                "username": "carol",
                "email": "carol@example.com",
                "newPassword": "roostersgocockledoodledoo",
            }))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({ "success": true }));
        let stored = get_user_by_id(user.id, &state.db_connection.lock().unwrap()).unwrap();
        assert!(
            stored
                .password_hash
                .verify("roostersgocockledoodledoo")
                .unwrap()
        );
    }

    #[tokio::test]
    async fn mismatched_username_and_email_is_rejected() {
        let (server, state) = get_test_server();
        insert_test_user(&state, "carol", "carol@example.com");
        insert_test_user(&state, "dave", "dave@example.com");

        let response = server
            .post(endpoints::FORGOT_PASSWORD)
            .json(&json!({
                "username": "carol",
                "email": "dave@example.com",
                "newPassword": "roostersgocockledoodledoo",
            }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "Username and email do not match" }));
    }

    #[tokio::test]
    async fn missing_new_password_is_rejected() {
        let (server, _) = get_test_server();

        server
            .post(endpoints::FORGOT_PASSWORD)
            .json(&json!({ "username": "carol", "email": "carol@example.com" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
