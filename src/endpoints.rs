//! The API endpoint URIs, shared by the server router and the client.
//!
//! For endpoints that take a parameter, e.g., '/api/accounts/{account_id}', use [format_endpoint].

/// The route for registering a new user.
pub const REGISTER: &str = "/api/auth/register";
/// The route for logging in with an email or username and password.
pub const LOG_IN: &str = "/api/auth/login";
/// The route for exchanging a refresh token for a new access token.
pub const REFRESH: &str = "/api/auth/refresh";
/// The route for resetting a forgotten password.
pub const FORGOT_PASSWORD: &str = "/api/auth/forgot-password";
/// The route for updating the logged in user's username and email.
pub const PROFILE: &str = "/api/auth/profile";
/// The route to list and create accounts.
pub const ACCOUNTS: &str = "/api/accounts";
/// The route to update or delete a single account.
pub const ACCOUNT: &str = "/api/accounts/{account_id}";
/// The route to list and upsert budgets.
pub const BUDGETS: &str = "/api/budgets";
/// The route to delete a single budget.
pub const BUDGET: &str = "/api/budgets/{budget_id}";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is the first substring that starts with a left brace and ends
/// with the next right brace. For example, in the endpoint path
/// '/api/accounts/{account_id}', '{account_id}' is the parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let Some(start) = endpoint_path.find('{') else {
        return endpoint_path.to_owned();
    };

    let end = endpoint_path[start..]
        .find('}')
        .map(|offset| start + offset + 1)
        .unwrap_or(endpoint_path.len());

    format!("{}{}{}", &endpoint_path[..start], id, &endpoint_path[end..])
}
