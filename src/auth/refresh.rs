//! The refresh endpoint, which trades a refresh token for a new access token.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::auth::{ACCESS_TOKEN_EXPIRES_IN, AuthError, TokenKeys, TokenKind};

/// The body sent to the refresh endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// The refresh token issued at log in or registration.
    pub refresh_token: Option<String>,
}

/// The body returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// The new access token.
    pub access_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}

/// Handler for refreshing an access token.
///
/// The refresh token itself is not rotated; it stays valid until it expires.
/// Any missing, invalid or expired refresh token gets a `401`.
pub async fn post_refresh(
    State(token_keys): State<TokenKeys>,
    Json(request): Json<RefreshRequest>,
) -> Response {
    let Some(refresh_token) = request.refresh_token.filter(|token| !token.is_empty()) else {
        return AuthError::MissingRefreshToken.into_response();
    };

    let claims = match token_keys.verify(TokenKind::Refresh, &refresh_token) {
        Ok(claims) => claims,
        Err(error) => {
            tracing::debug!("rejected refresh token: {error}");
            return AuthError::InvalidRefreshToken.into_response();
        }
    };

    match token_keys.issue(TokenKind::Access, claims.user_id) {
        Ok(access_token) => {
            tracing::debug!(user_id = %claims.user_id, "issued refreshed access token");
            Json(RefreshResponse {
                access_token,
                expires_in: ACCESS_TOKEN_EXPIRES_IN,
            })
            .into_response()
        }
        Err(error) => error.into_response(),
    }
}
