//! Code for creating the user table and fetching or updating users in the database.

use std::fmt::Display;

use rusqlite::{Connection, OptionalExtension, Row, named_params};
use serde::{Deserialize, Serialize};

use crate::{Error, PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered user of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The unique display name of the user.
    pub username: String,
    /// The unique email address of the user.
    pub email: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
}

impl User {
    /// The public identity of the user, safe to send to clients.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// The identity of a user as seen by clients.
///
/// This is what the auth endpoints return and what the client keeps in its
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user's ID.
    pub id: UserID,
    /// The user's display name.
    pub username: String,
    /// The user's email address.
    pub email: String,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
    })
}

/// Create and insert a new user into the database.
///
/// # Errors
///
/// Returns [Error::DuplicateUser] if the username or email is already taken,
/// or [Error::SqlError] if another SQL related error occurred.
pub fn create_user(
    username: &str,
    email: &str,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<User, Error> {
    let result = connection.execute(
        "INSERT INTO user (username, email, password) VALUES (?1, ?2, ?3)",
        (username, email, password_hash.as_str()),
    );

    match result {
        // Code 2067 occurs when a UNIQUE constraint failed.
        Err(rusqlite::Error::SqliteFailure(sql_error, _)) if sql_error.extended_code == 2067 => {
            return Err(Error::DuplicateUser);
        }
        Err(error) => return Err(error.into()),
        Ok(_) => {}
    }

    Ok(User {
        id: UserID::new(connection.last_insert_rowid()),
        username: username.to_owned(),
        email: email.to_owned(),
        password_hash,
    })
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare("SELECT id, username, email, password FROM user WHERE id = :id")?
        .query_row(&[(":id", &user_id.as_i64())], map_row_to_user)
        .map_err(|error| error.into())
}

/// Get the user whose email or username equals `login`.
///
/// # Errors
///
/// Returns [Error::NotFound] if no user matches.
pub fn get_user_by_login(login: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(
            "SELECT id, username, email, password FROM user WHERE email = :login OR username = :login",
        )?
        .query_row(named_params! { ":login": login }, map_row_to_user)
        .map_err(|error| error.into())
}

/// Get the ID of the user that has both `username` and `email`.
///
/// # Errors
///
/// Returns [Error::NotFound] if no single user has both.
pub fn get_user_id_by_username_and_email(
    username: &str,
    email: &str,
    connection: &Connection,
) -> Result<UserID, Error> {
    connection
        .query_row(
            "SELECT id FROM user WHERE username = ?1 AND email = ?2",
            (username, email),
            |row| row.get(0).map(UserID::new),
        )
        .map_err(|error| error.into())
}

/// Check whether `username` or `email` belongs to any user other than `except`.
///
/// # Errors
///
/// Returns [Error::SqlError] if an SQL related error occurred.
pub fn is_username_or_email_taken(
    username: &str,
    email: &str,
    except: Option<UserID>,
    connection: &Connection,
) -> Result<bool, Error> {
    let except = except.map(|id| id.as_i64()).unwrap_or(0);

    connection
        .query_row(
            "SELECT id FROM user WHERE (email = ?1 OR username = ?2) AND id != ?3 LIMIT 1",
            (email, username, except),
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|id| id.is_some())
        .map_err(|error| error.into())
}

/// Set the username and email of the user `user_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist, or
/// [Error::UsernameOrEmailInUse] if another user already has either value.
pub fn update_profile(
    user_id: UserID,
    username: &str,
    email: &str,
    connection: &Connection,
) -> Result<(), Error> {
    let result = connection.execute(
        "UPDATE user SET username = ?1, email = ?2 WHERE id = ?3",
        (username, email, user_id.as_i64()),
    );

    match result {
        Ok(0) => Err(Error::NotFound),
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(sql_error, _)) if sql_error.extended_code == 2067 => {
            Err(Error::UsernameOrEmailInUse)
        }
        Err(error) => Err(error.into()),
    }
}

/// Replace the password hash of the user `user_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist.
pub fn update_password(
    user_id: UserID,
    password_hash: &PasswordHash,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET password = ?1 WHERE id = ?2",
        (password_hash.as_str(), user_id.as_i64()),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}
