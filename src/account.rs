//! Per-user accounts (cash, bank, credit card, ...) and their CRUD endpoints.
//!
//! Balances start at zero and are not adjusted here.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{AppState, Error, SuccessResponse, db::lock_connection, user::UserID};

/// The ID of an account.
pub type AccountId = i64;

const DEFAULT_ACCOUNT_NAME: &str = "New Account";
const DEFAULT_ACCOUNT_TYPE: &str = "cash";

/// A place money is kept, e.g. a wallet or a bank account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The id for the account.
    pub id: AccountId,
    /// The display name of the account.
    pub name: String,
    /// The kind of account, e.g. "cash" or "bank".
    #[serde(rename = "type")]
    pub kind: String,
    /// The current balance.
    pub balance: f64,
}

/// The body for creating or updating an account. Missing fields keep their
/// current (or default) value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRequest {
    /// The display name of the account.
    pub name: Option<String>,
    /// The kind of account.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// The state needed by the account endpoints.
#[derive(Debug, Clone)]
pub struct AccountState {
    /// The database connection for managing accounts.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AccountState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Create the account table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            balance REAL NOT NULL DEFAULT 0,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        balance: row.get(3)?,
    })
}

/// Get all accounts of `user_id` ordered by creation.
pub fn get_accounts(user_id: UserID, connection: &Connection) -> Result<Vec<Account>, Error> {
    connection
        .prepare("SELECT id, name, type, balance FROM account WHERE user_id = ?1 ORDER BY id")?
        .query_map((user_id.as_i64(),), map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(Error::from))
        .collect()
}

/// Insert a new account for `user_id` with a zero balance.
pub fn create_account(
    user_id: UserID,
    request: &AccountRequest,
    connection: &Connection,
) -> Result<Account, Error> {
    let name = request.name.as_deref().unwrap_or(DEFAULT_ACCOUNT_NAME);
    let kind = request.kind.as_deref().unwrap_or(DEFAULT_ACCOUNT_TYPE);

    connection.execute(
        "INSERT INTO account (user_id, name, type, balance) VALUES (?1, ?2, ?3, 0)",
        (user_id.as_i64(), name, kind),
    )?;

    Ok(Account {
        id: connection.last_insert_rowid(),
        name: name.to_owned(),
        kind: kind.to_owned(),
        balance: 0.0,
    })
}

/// Update the name and/or type of an account owned by `user_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if `user_id` has no account with `account_id`.
pub fn update_account(
    user_id: UserID,
    account_id: AccountId,
    request: &AccountRequest,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE account SET name = COALESCE(?1, name), type = COALESCE(?2, type)
        WHERE id = ?3 AND user_id = ?4",
        (
            request.name.as_deref(),
            request.kind.as_deref(),
            account_id,
            user_id.as_i64(),
        ),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}

/// Delete an account owned by `user_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if `user_id` has no account with `account_id`.
pub fn delete_account(
    user_id: UserID,
    account_id: AccountId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM account WHERE id = ?1 AND user_id = ?2",
        (account_id, user_id.as_i64()),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}

/// A route handler for listing the user's accounts.
pub async fn get_accounts_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Vec<Account>>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    get_accounts(user_id, &connection).map(Json)
}

/// A route handler for creating an account, responds with the new account.
pub async fn create_account_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<Account>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    create_account(user_id, &request, &connection).map(Json)
}

/// A route handler for renaming or retyping an account.
pub async fn update_account_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<SuccessResponse>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    update_account(user_id, account_id, &request, &connection).map(|_| SuccessResponse::ok())
}

/// A route handler for deleting an account.
pub async fn delete_account_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<SuccessResponse>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    delete_account(user_id, account_id, &connection).map(|_| SuccessResponse::ok())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use crate::{
        Error, PasswordHash,
        account::{
            AccountRequest, create_account, delete_account, get_accounts, update_account,
        },
        initialize_db,
        user::{User, create_user},
    };

    fn get_test_connection() -> (Connection, User, User) {
        let connection = Connection::open_in_memory().unwrap();
        initialize_db(&connection).unwrap();
        let alice = create_user(
            "alice",
            "alice@example.com",
            PasswordHash::new_unchecked("hash"),
            &connection,
        )
        .unwrap();
        let bob = create_user(
            "bob",
            "bob@example.com",
            PasswordHash::new_unchecked("hash"),
            &connection,
        )
        .unwrap();

        (connection, alice, bob)
    }

    #[test]
    fn create_account_uses_defaults() {
        let (connection, alice, _) = get_test_connection();

        let account = create_account(alice.id, &AccountRequest::default(), &connection).unwrap();

        assert_eq!(account.name, "New Account");
        assert_eq!(account.kind, "cash");
        assert_eq!(account.balance, 0.0);
        assert_eq!(get_accounts(alice.id, &connection), Ok(vec![account]));
    }

    #[test]
    fn accounts_are_private_to_their_owner() {
        let (connection, alice, bob) = get_test_connection();
        let account = create_account(alice.id, &AccountRequest::default(), &connection).unwrap();

        assert_eq!(get_accounts(bob.id, &connection), Ok(vec![]));
        assert_eq!(
            delete_account(bob.id, account.id, &connection),
            Err(Error::NotFound)
        );
        assert_eq!(
            update_account(bob.id, account.id, &AccountRequest::default(), &connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn update_keeps_missing_fields() {
        let (connection, alice, _) = get_test_connection();
        let account = create_account(
            alice.id,
            &AccountRequest {
                name: Some("Wallet".to_owned()),
                kind: Some("cash".to_owned()),
            },
            &connection,
        )
        .unwrap();

        update_account(
            alice.id,
            account.id,
            &AccountRequest {
                name: None,
                kind: Some("bank".to_owned()),
            },
            &connection,
        )
        .unwrap();

        let accounts = get_accounts(alice.id, &connection).unwrap();
        assert_eq!(accounts[0].name, "Wallet");
        assert_eq!(accounts[0].kind, "bank");
    }

    #[test]
    fn delete_removes_account() {
        let (connection, alice, _) = get_test_connection();
        let account = create_account(alice.id, &AccountRequest::default(), &connection).unwrap();

        delete_account(alice.id, account.id, &connection).unwrap();

        assert_eq!(get_accounts(alice.id, &connection), Ok(vec![]));
    }
}
