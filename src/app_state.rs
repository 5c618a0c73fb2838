//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{Error, PasswordHash, auth::TokenKeys, db::initialize};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The keys for signing and verifying access and refresh tokens.
    pub token_keys: TokenKeys,

    /// The bcrypt cost used when hashing new passwords.
    pub password_cost: u32,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    /// `access_secret` and `refresh_secret` sign access and refresh tokens
    /// respectively and should differ.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        access_secret: &str,
        refresh_secret: &str,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        if access_secret == refresh_secret {
            tracing::warn!(
                "the access and refresh token secrets are identical, set JWT_REFRESH_SECRET to a different value"
            );
        }

        Ok(Self {
            token_keys: TokenKeys::new(access_secret, refresh_secret),
            password_cost: PasswordHash::DEFAULT_COST,
            db_connection: Arc::new(Mutex::new(db_connection)),
        })
    }

    /// Set the bcrypt cost used when hashing new passwords.
    ///
    /// Tests use a low cost to keep hashing fast.
    pub fn with_password_cost(mut self, password_cost: u32) -> Self {
        self.password_cost = password_cost;
        self
    }
}
