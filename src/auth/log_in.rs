//! The log in endpoint, which exchanges an email or username and password for a token pair.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    auth::{AuthError, AuthResponse, AuthState, non_empty},
    user::get_user_by_login,
};

/// The credentials sent to the log in endpoint.
///
/// Either `email` or `username` identifies the user; `email` wins if both are given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogInRequest {
    /// The user's email address.
    pub email: Option<String>,
    /// The user's username.
    pub username: Option<String>,
    /// The user's password.
    pub password: Option<String>,
}

/// Handler for log in requests.
///
/// Responds with an [AuthResponse] on success, a `400` if the login or
/// password is missing, and a `401` if they do not match a user.
pub async fn post_log_in(
    State(state): State<AuthState>,
    Json(request): Json<LogInRequest>,
) -> Response {
    let login = non_empty(&request.email).or(non_empty(&request.username));
    let password = request.password.as_deref().filter(|p| !p.is_empty());
    let (Some(login), Some(password)) = (login, password) else {
        return Error::MissingFields("Email/username and password are required").into_response();
    };

    let user = {
        let connection = match state.connection() {
            Ok(connection) => connection,
            Err(error) => return error.into_response(),
        };

        match get_user_by_login(login, &connection) {
            Ok(user) => user,
            Err(Error::NotFound) => return AuthError::WrongCredentials.into_response(),
            Err(error) => return error.into_response(),
        }
    };

    match user.password_hash.verify(password) {
        Ok(true) => {}
        Ok(false) => return AuthError::WrongCredentials.into_response(),
        Err(error) => {
            tracing::error!("Error verifying password: {error}");
            return Error::HashingError(error.to_string()).into_response();
        }
    }

    match AuthResponse::issue(user.profile(), &state.token_keys) {
        Ok(body) => {
            tracing::info!(user_id = %user.id, "user logged in");
            Json(body).into_response()
        }
        Err(error) => error.into_response(),
    }
}
