//! Monthly spending budgets, optionally per category.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::{Connection, Row, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};
use time::Month;

use crate::{AppState, Error, SuccessResponse, db::lock_connection, user::UserID};

/// The ID of a budget.
pub type BudgetId = i64;

/// A spending limit for a month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// The id for the budget.
    pub id: BudgetId,
    /// The month the budget applies to, formatted as `YYYY-MM`.
    pub month: String,
    /// The amount that may be spent.
    pub amount: f64,
    /// The category the budget is for. Empty for the overall monthly budget.
    pub category: String,
}

/// The body for creating or replacing a budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetRequest {
    /// The month formatted as `YYYY-MM`.
    pub month: Option<String>,
    /// The amount that may be spent.
    pub amount: Option<f64>,
    /// The category, defaults to the overall monthly budget.
    pub category: Option<String>,
}

/// The query parameters for listing budgets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BudgetQuery {
    /// Only list budgets for this month.
    pub month: Option<String>,
}

/// The state needed by the budget endpoints.
#[derive(Debug, Clone)]
pub struct BudgetState {
    /// The database connection for managing budgets.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for BudgetState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Create the budget table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_budget_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            month TEXT NOT NULL,
            amount REAL NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            UNIQUE(user_id, month, category),
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Check that `month` is a calendar month written as `YYYY-MM`.
fn validate_month(month: &str) -> Result<(), Error> {
    let invalid = || Error::InvalidMonth(month.to_owned());

    let (year, month_number) = month.split_once('-').ok_or_else(invalid)?;

    if year.len() != 4 || month_number.len() != 2 {
        return Err(invalid());
    }

    year.parse::<u16>().map_err(|_| invalid())?;
    let month_number = month_number.parse::<u8>().map_err(|_| invalid())?;
    Month::try_from(month_number).map_err(|_| invalid())?;

    Ok(())
}

fn map_row_to_budget(row: &Row) -> Result<Budget, rusqlite::Error> {
    Ok(Budget {
        id: row.get(0)?,
        month: row.get(1)?,
        amount: row.get(2)?,
        category: row.get(3)?,
    })
}

/// Get the budgets of `user_id`, newest month first, optionally limited to one month.
pub fn get_budgets(
    user_id: UserID,
    month: Option<&str>,
    connection: &Connection,
) -> Result<Vec<Budget>, Error> {
    let mut query = "SELECT id, month, amount, category FROM budget WHERE user_id = ?".to_owned();
    let mut params = vec![Value::Integer(user_id.as_i64())];

    if let Some(month) = month {
        query.push_str(" AND month = ?");
        params.push(Value::Text(month.to_owned()));
    }

    query.push_str(" ORDER BY month DESC, category");

    connection
        .prepare(&query)?
        .query_map(params_from_iter(params), map_row_to_budget)?
        .map(|maybe_budget| maybe_budget.map_err(Error::from))
        .collect()
}

/// Create a budget, or replace the amount of the budget for the same month and category.
///
/// # Errors
///
/// Returns [Error::MissingFields] if the month or amount is missing and
/// [Error::InvalidMonth] if the month is not formatted as `YYYY-MM`.
pub fn upsert_budget(
    user_id: UserID,
    request: &BudgetRequest,
    connection: &Connection,
) -> Result<(), Error> {
    let (Some(month), Some(amount)) = (request.month.as_deref(), request.amount) else {
        return Err(Error::MissingFields("Month and amount are required"));
    };

    validate_month(month)?;
    let category = request.category.as_deref().unwrap_or_default();

    connection.execute(
        "INSERT INTO budget (user_id, month, amount, category) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(user_id, month, category) DO UPDATE SET amount = excluded.amount",
        (user_id.as_i64(), month, amount, category),
    )?;

    Ok(())
}

/// Delete a budget owned by `user_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if `user_id` has no budget with `budget_id`.
pub fn delete_budget(
    user_id: UserID,
    budget_id: BudgetId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM budget WHERE id = ?1 AND user_id = ?2",
        (budget_id, user_id.as_i64()),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}

/// A route handler for listing the user's budgets.
pub async fn get_budgets_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<BudgetQuery>,
) -> Result<Json<Vec<Budget>>, Error> {
    let month = query.month.as_deref().filter(|month| !month.is_empty());
    let connection = lock_connection(&state.db_connection)?;

    get_budgets(user_id, month, &connection).map(Json)
}

/// A route handler for setting a budget.
pub async fn upsert_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Json(request): Json<BudgetRequest>,
) -> Result<Json<SuccessResponse>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    upsert_budget(user_id, &request, &connection).map(|_| SuccessResponse::ok())
}

/// A route handler for deleting a budget.
pub async fn delete_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(budget_id): Path<BudgetId>,
) -> Result<Json<SuccessResponse>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    delete_budget(user_id, budget_id, &connection).map(|_| SuccessResponse::ok())
}
