//! Auth service client methods

use crate::{
    AuthResponse, ForgotPasswordRequest, LogInRequest, RegisterRequest, SuccessResponse,
    UpdateProfileRequest, UserProfile,
    client::{ApiClient, ApiRequest, ClientError},
    endpoints,
};

impl ApiClient {
    /// Log in with an email address or username and start a new session.
    pub async fn login(&self, login: &str, password: &str) -> Result<UserProfile, ClientError> {
        let (email, username) = if login.contains('@') {
            (Some(login.to_owned()), None)
        } else {
            (None, Some(login.to_owned()))
        };
        let request = LogInRequest {
            email,
            username,
            password: Some(password.to_owned()),
        };

        let auth: AuthResponse = self
            .send_unauthenticated(ApiRequest::post(endpoints::LOG_IN, &request)?)
            .await?
            .json()?;

        self.start_session(auth)
    }

    /// Register a new user and start a session for them.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, ClientError> {
        let request = RegisterRequest {
            username: Some(username.to_owned()),
            email: Some(email.to_owned()),
            password: Some(password.to_owned()),
        };

        let auth: AuthResponse = self
            .send_unauthenticated(ApiRequest::post(endpoints::REGISTER, &request)?)
            .await?
            .json()?;

        self.start_session(auth)
    }

    /// Set a new password for the user with `username` and `email`.
    ///
    /// This does not log the user in.
    pub async fn forgot_password(
        &self,
        username: &str,
        email: &str,
        new_password: &str,
    ) -> Result<(), ClientError> {
        let request = ForgotPasswordRequest {
            username: Some(username.to_owned()),
            email: Some(email.to_owned()),
            new_password: Some(new_password.to_owned()),
        };

        self.send_unauthenticated(ApiRequest::post(endpoints::FORGOT_PASSWORD, &request)?)
            .await?
            .json::<SuccessResponse>()?;

        Ok(())
    }

    /// Change the username and email of the logged in user.
    ///
    /// The stored user is updated if there is one.
    pub async fn update_profile(&self, username: &str, email: &str) -> Result<(), ClientError> {
        let request = UpdateProfileRequest {
            username: Some(username.to_owned()),
            email: Some(email.to_owned()),
        };

        let _: SuccessResponse = self.put_json(endpoints::PROFILE, &request).await?;

        if let Some(user) = self.token_store().user() {
            self.token_store().set_user(UserProfile {
                username: username.to_owned(),
                email: email.to_owned(),
                ..user
            })?;
        }

        Ok(())
    }

    /// End the session. The tokens are forgotten, not revoked.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.token_store().logout()?;
        tracing::info!("logged out");
        Ok(())
    }

    fn start_session(&self, auth: AuthResponse) -> Result<UserProfile, ClientError> {
        self.token_store()
            .set_tokens(&auth.access_token, &auth.refresh_token, auth.user.clone())?;
        tracing::info!(user_id = %auth.user.id, "logged in");

        Ok(auth.user)
    }
}
