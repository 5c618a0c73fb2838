//! The auth service: token issuing endpoints and the middleware that guards protected routes.
//!
//! Clients log in or register to receive a short-lived access token and a
//! long-lived refresh token. Protected routes answer an expired access token
//! with a `401` carrying the code [TOKEN_EXPIRED_CODE], which tells the
//! client to exchange its refresh token at the refresh endpoint.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppState, Error, db::lock_connection, user::UserProfile};

mod forgot_password;
mod log_in;
mod middleware;
mod profile;
mod refresh;
mod register;
mod token;

pub use forgot_password::{ForgotPasswordRequest, post_forgot_password};
pub use log_in::{LogInRequest, post_log_in};
pub use middleware::auth_guard;
pub use profile::{UpdateProfileRequest, put_profile};
pub use refresh::{RefreshRequest, RefreshResponse, post_refresh};
pub use register::{RegisterRequest, post_register};
pub use token::{
    ACCESS_TOKEN_DURATION, Claims, REFRESH_TOKEN_DURATION, TokenError, TokenKeys, TokenKind,
};

/// The error code sent with a `401` when the access token has expired.
pub const TOKEN_EXPIRED_CODE: &str = "TOKEN_EXPIRED";

/// The error code sent with a `401` when the access token is missing or invalid.
pub const UNAUTHORIZED_CODE: &str = "UNAUTHORIZED";

/// The number of seconds an access token is valid for, as reported to clients.
pub const ACCESS_TOKEN_EXPIRES_IN: i64 = ACCESS_TOKEN_DURATION.whole_seconds();

/// The state needed by the auth endpoints.
#[derive(Clone)]
pub struct AuthState {
    /// The keys for signing and verifying tokens.
    pub token_keys: TokenKeys,
    /// The bcrypt cost used when hashing new passwords.
    pub password_cost: u32,
    /// The database connection for reading and updating users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AuthState {
    fn connection(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        lock_connection(&self.db_connection)
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            token_keys: state.token_keys.clone(),
            password_cost: state.password_cost,
            db_connection: state.db_connection.clone(),
        }
    }
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        state.token_keys.clone()
    }
}

/// The body returned after a successful log in or registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Always `true`.
    pub success: bool,
    /// The identity of the authenticated user.
    pub user: UserProfile,
    /// The new access token.
    pub access_token: String,
    /// The new refresh token.
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}

impl AuthResponse {
    fn issue(user: UserProfile, token_keys: &TokenKeys) -> Result<Self, Error> {
        Ok(Self {
            access_token: token_keys.issue(TokenKind::Access, user.id)?,
            refresh_token: token_keys.issue(TokenKind::Refresh, user.id)?,
            user,
            success: true,
            expires_in: ACCESS_TOKEN_EXPIRES_IN,
        })
    }
}

/// The body returned by endpoints that only report success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Always `true`.
    pub success: bool,
}

impl SuccessResponse {
    pub(crate) fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// Authentication failures that are reported with a `401`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No bearer token was sent with the request.
    #[error("Missing or invalid token")]
    MissingToken,
    /// The bearer token could not be verified.
    #[error("Invalid token")]
    InvalidToken,
    /// The bearer token was valid but has expired.
    #[error("Access token expired")]
    TokenExpired,
    /// The login or password did not match a user.
    #[error("Invalid email or password")]
    WrongCredentials,
    /// The refresh endpoint was called without a refresh token.
    #[error("Refresh token required")]
    MissingRefreshToken,
    /// The refresh token was invalid or expired.
    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,
}

impl From<TokenError> for AuthError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid => AuthError::InvalidToken,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = match self {
            AuthError::MissingToken | AuthError::InvalidToken => {
                json!({ "code": UNAUTHORIZED_CODE, "message": self.to_string() })
            }
            AuthError::TokenExpired => {
                json!({ "code": TOKEN_EXPIRED_CODE, "message": self.to_string() })
            }
            AuthError::WrongCredentials
            | AuthError::MissingRefreshToken
            | AuthError::InvalidRefreshToken => json!({ "error": self.to_string() }),
        };

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Trim the field and treat an empty string as missing.
fn non_empty(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
