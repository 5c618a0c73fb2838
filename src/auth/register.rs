//! The registration endpoint for creating a user and starting their first session.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};

use crate::{
    Error, PasswordHash, ValidatedPassword,
    auth::{AuthResponse, AuthState, non_empty},
    user::{User, create_user, is_username_or_email_taken},
};

/// The details sent to the registration endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// The unique display name for the new user.
    pub username: Option<String>,
    /// The unique email address for the new user.
    pub email: Option<String>,
    /// The password for the new user.
    pub password: Option<String>,
}

/// Handler for registering a new user.
///
/// On success the user is logged in straight away and the response is the
/// same [AuthResponse] the log in endpoint returns.
pub async fn post_register(
    State(state): State<AuthState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    match register(&state, &request) {
        Ok(user) => match AuthResponse::issue(user.profile(), &state.token_keys) {
            Ok(body) => {
                tracing::info!(user_id = %user.id, "registered new user");
                Json(body).into_response()
            }
            Err(error) => error.into_response(),
        },
        Err(error) => error.into_response(),
    }
}

fn register(state: &AuthState, request: &RegisterRequest) -> Result<User, Error> {
    let username = non_empty(&request.username);
    let email = non_empty(&request.email);
    let password = request.password.as_deref().filter(|p| !p.is_empty());
    let (Some(username), Some(email), Some(password)) = (username, email, password) else {
        return Err(Error::MissingFields(
            "Username, email and password are required",
        ));
    };

    if !EmailAddress::is_valid(email) {
        return Err(Error::InvalidEmail(email.to_owned()));
    }

    if is_username_or_email_taken(username, email, None, &*state.connection()?)? {
        return Err(Error::DuplicateUser);
    }

    let password = ValidatedPassword::new(password, &[username, email])?;
    let password_hash = PasswordHash::new(password, state.password_cost)?;

    create_user(username, email, password_hash, &*state.connection()?)
}
