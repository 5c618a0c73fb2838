//! Client error types

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::client::storage::StorageError;

/// The errors returned by [ApiClient](crate::client::ApiClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status that is not an expired session.
    #[error("Server error {status}: {message}")]
    Status {
        /// The HTTP status code.
        status: StatusCode,
        /// The machine readable error code, if the server sent one.
        code: Option<String>,
        /// The error message from the server.
        message: String,
    },

    /// The request was rejected as unauthenticated and could not be recovered
    /// by refreshing the access token.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The access token could not be refreshed. The session has been ended.
    #[error("Could not refresh the session: {0}")]
    Refresh(#[from] RefreshError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session could not be read from or written to storage.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Why a token refresh failed.
///
/// Every request waiting on the same refresh receives a clone of the error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The auth service refused the refresh token, e.g. because it expired.
    #[error("refresh token rejected ({status}): {message}")]
    Rejected {
        /// The HTTP status code.
        status: StatusCode,
        /// The error message from the auth service.
        message: String,
    },

    /// The auth service could not be reached.
    #[error("could not reach the auth service: {0}")]
    Transport(String),

    /// The auth service answered with a body that is not a refresh response.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    /// There was no refresh token to refresh with, so the session was ended.
    #[error("no refresh token, log in again")]
    MissingToken,

    /// The request driving the refresh was cancelled before the refresh finished.
    #[error("the refresh was abandoned before it finished")]
    Abandoned,
}

/// The JSON error bodies sent by the server.
///
/// Auth failures use `code` and `message`, everything else uses `error`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) code: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// The human readable message, falling back to `fallback`.
    pub(crate) fn into_message(self, fallback: &str) -> String {
        self.message
            .or(self.error)
            .unwrap_or_else(|| fallback.to_owned())
    }
}

impl ClientError {
    /// Create an error from a failed response.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let mut error_body = ErrorBody::parse(body);
        let code = error_body.code.take();
        let fallback = if body.is_empty() {
            status.to_string()
        } else {
            body.to_owned()
        };

        Self::Status {
            status,
            code,
            message: error_body.into_message(&fallback),
        }
    }

    /// The HTTP status of the failed response, if the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::SessionExpired(_) => Some(StatusCode::UNAUTHORIZED),
            ClientError::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::ClientError;

    #[test]
    fn from_status_reads_error_field() {
        let error = ClientError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"error":"Username and email do not match"}"#,
        );

        assert!(matches!(
            error,
            ClientError::Status { status: StatusCode::BAD_REQUEST, code: None, ref message }
                if message == "Username and email do not match"
        ));
    }

    #[test]
    fn from_status_reads_code_and_message() {
        let error = ClientError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"UNAUTHORIZED","message":"Invalid token"}"#,
        );

        assert!(matches!(
            error,
            ClientError::Status { code: Some(ref code), ref message, .. }
                if code == "UNAUTHORIZED" && message == "Invalid token"
        ));
    }

    #[test]
    fn from_status_falls_back_to_raw_body() {
        let error = ClientError::from_status(StatusCode::BAD_GATEWAY, "upstream down");

        assert_eq!(error.to_string(), "Server error 502 Bad Gateway: upstream down");
        assert_eq!(error.status(), Some(StatusCode::BAD_GATEWAY));
    }
}
