//! The seams between the client and the network: sending API requests and
//! asking the auth service for a new access token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    RefreshRequest, RefreshResponse, TOKEN_EXPIRED_CODE,
    client::error::{ClientError, ErrorBody, RefreshError},
    endpoints,
};

/// A request to the API, independent of any access token.
///
/// The same request may be sent twice: once with the original access token
/// and once more after the token was refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// The HTTP method.
    pub method: Method,
    /// The path relative to the API base URL, e.g. `/api/accounts`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// The JSON body, if any.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Create a request without a body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` request with a JSON body.
    pub fn post(path: impl Into<String>, body: &impl Serialize) -> Result<Self, ClientError> {
        Self::new(Method::POST, path).json(body)
    }

    /// A `PUT` request with a JSON body.
    pub fn put(path: impl Into<String>, body: &impl Serialize) -> Result<Self, ClientError> {
        Self::new(Method::PUT, path).json(body)
    }

    /// A `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Set the JSON body.
    pub fn json(mut self, body: &impl Serialize) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// The status and body of a response to an [ApiRequest].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// The HTTP status.
    pub status: StatusCode,
    /// The response body.
    pub body: String,
}

impl ApiResponse {
    /// Create a response.
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is `2xx`.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the server declared the access token expired.
    ///
    /// That is a `401` with the code [TOKEN_EXPIRED_CODE], or any `401` to a
    /// request that was sent without an access token.
    pub fn is_authentication_expired(&self, sent_access_token: bool) -> bool {
        if self.status != StatusCode::UNAUTHORIZED {
            return false;
        }

        !sent_access_token
            || ErrorBody::parse(&self.body).code.as_deref() == Some(TOKEN_EXPIRED_CODE)
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn a non-success response into [ClientError::Status].
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::from_status(self.status, &self.body))
        }
    }
}

/// Sends API requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` with `access_token` as the bearer token, if given.
    ///
    /// Any response the server sends is `Ok`, whatever its status.
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, ClientError>;
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Get a new access token for `refresh_token`.
    ///
    /// Any error means the session cannot be continued.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError>;
}

/// The [Transport] and [AuthService] that talk to the server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client could not be created.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("wallet_rs/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The API base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let mut http_request = self
            .client
            .request(request.method.clone(), self.url(&request.path));

        if !request.query.is_empty() {
            http_request = http_request.query(&request.query);
        }

        if let Some(body) = &request.body {
            http_request = http_request.json(body);
        }

        if let Some(access_token) = access_token {
            http_request = http_request.bearer_auth(access_token);
        }

        let response = http_request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(method = %request.method, path = %request.path, %status, "api response");

        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl AuthService for HttpTransport {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        let response = self
            .client
            .post(self.url(endpoints::REFRESH))
            .json(&RefreshRequest {
                refresh_token: Some(refresh_token.to_owned()),
            })
            .send()
            .await
            .map_err(|error| RefreshError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| RefreshError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status,
                message: ErrorBody::parse(&body).into_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|error| RefreshError::InvalidResponse(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::ApiResponse;

    #[test]
    fn token_expired_code_is_authentication_expired() {
        let response = ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"TOKEN_EXPIRED","message":"Access token expired"}"#,
        );

        assert!(response.is_authentication_expired(true));
    }

    #[test]
    fn other_unauthorized_codes_are_not_expired_when_a_token_was_sent() {
        let response = ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"UNAUTHORIZED","message":"Invalid token"}"#,
        );

        assert!(!response.is_authentication_expired(true));
    }

    #[test]
    fn unauthorized_without_token_is_expired() {
        let response = ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"UNAUTHORIZED","message":"Missing or invalid token"}"#,
        );

        assert!(response.is_authentication_expired(false));
    }

    #[test]
    fn other_statuses_are_never_expired() {
        let response = ApiResponse::new(
            StatusCode::FORBIDDEN,
            r#"{"code":"TOKEN_EXPIRED","message":"Access token expired"}"#,
        );

        assert!(!response.is_authentication_expired(true));
        assert!(!response.is_authentication_expired(false));
    }
}
