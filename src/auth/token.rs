//! Signing and verification of the JSON Web Tokens used for access and refresh tokens.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{Error, user::UserID};

/// How long an access token is valid for.
pub const ACCESS_TOKEN_DURATION: Duration = Duration::minutes(15);

/// How long a refresh token is valid for.
pub const REFRESH_TOKEN_DURATION: Duration = Duration::days(7);

/// The contents of a JSON Web Token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The user the token was issued to.
    pub user_id: UserID,
    /// The time the token was issued, in seconds since the Unix epoch.
    pub iat: i64,
    /// The expiry time of the token, in seconds since the Unix epoch.
    pub exp: i64,
}

/// The two kinds of token the server issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Short-lived token attached to every API call.
    Access,
    /// Long-lived token only accepted by the refresh endpoint.
    Refresh,
}

/// Why a token failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The signature was valid but the token is past its expiry time.
    #[error("token expired")]
    Expired,
    /// The token was malformed, signed with another key, or otherwise invalid.
    #[error("invalid token")]
    Invalid,
}

#[derive(Clone)]
struct KeyPair {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// The keys used to sign and verify tokens.
///
/// Access and refresh tokens use different secrets, so a refresh token is
/// never accepted as an access token and vice versa.
#[derive(Clone)]
pub struct TokenKeys {
    access: KeyPair,
    refresh: KeyPair,
}

impl TokenKeys {
    /// Create the keys from the access and refresh token secrets.
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign a token of `kind` for `user_id` as if it were issued at `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns [Error::TokenCreation] if the token could not be encoded.
    pub fn issue_at(
        &self,
        kind: TokenKind,
        user_id: UserID,
        issued_at: OffsetDateTime,
    ) -> Result<String, Error> {
        let duration = match kind {
            TokenKind::Access => ACCESS_TOKEN_DURATION,
            TokenKind::Refresh => REFRESH_TOKEN_DURATION,
        };
        let claims = Claims {
            user_id,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + duration).unix_timestamp(),
        };

        encode(&Header::default(), &claims, &self.keys(kind).encoding_key)
            .map_err(|error| Error::TokenCreation(error.to_string()))
    }

    /// Sign a token of `kind` for `user_id` that is valid from now.
    ///
    /// # Errors
    ///
    /// Returns [Error::TokenCreation] if the token could not be encoded.
    pub fn issue(&self, kind: TokenKind, user_id: UserID) -> Result<String, Error> {
        self.issue_at(kind, user_id, OffsetDateTime::now_utc())
    }

    /// Verify `token` as a token of `kind` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [TokenError::Expired] for a correctly signed token past its
    /// expiry and [TokenError::Invalid] for anything else.
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.keys(kind).decoding_key, &validation)
            .map(|token_data| token_data.claims)
            .map_err(|error| match error.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}
