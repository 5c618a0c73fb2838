//! Updating the username and email of the logged in user.

use axum::{
    Extension, Json,
    extract::State,
    response::{IntoResponse, Response},
};
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    auth::{AuthState, SuccessResponse, non_empty},
    user::{UserID, is_username_or_email_taken, update_profile},
};

/// The body sent to the profile endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    /// The new username.
    pub username: Option<String>,
    /// The new email address.
    pub email: Option<String>,
}

/// Handler for updating the profile of the user identified by the access token.
///
/// Must sit behind [auth_guard](crate::auth::auth_guard).
pub async fn put_profile(
    State(state): State<AuthState>,
    Extension(user_id): Extension<UserID>,
    Json(request): Json<UpdateProfileRequest>,
) -> Response {
    match change_profile(&state, user_id, &request) {
        Ok(()) => SuccessResponse::ok().into_response(),
        Err(error) => error.into_response(),
    }
}

fn change_profile(
    state: &AuthState,
    user_id: UserID,
    request: &UpdateProfileRequest,
) -> Result<(), Error> {
    let (Some(username), Some(email)) = (non_empty(&request.username), non_empty(&request.email))
    else {
        return Err(Error::MissingFields("Username and email are required"));
    };

    if !EmailAddress::is_valid(email) {
        return Err(Error::InvalidEmail(email.to_owned()));
    }

    let connection = state.connection()?;
    if is_username_or_email_taken(username, email, Some(user_id), &connection)? {
        return Err(Error::UsernameOrEmailInUse);
    }

    update_profile(user_id, username, email, &connection)?;
    tracing::info!(%user_id, "updated profile");

    Ok(())
}
