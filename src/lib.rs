//! Wallet is a personal finance tracker.
//!
//! This library provides:
//! - a REST API server that issues short-lived access tokens and long-lived
//!   refresh tokens and serves per-user accounts and budgets, see [build_router];
//! - a [client] that attaches the access token to every request and
//!   transparently refreshes it, sharing a single refresh between all
//!   requests that find their token expired at the same time.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

mod account;
mod app_state;
mod auth;
mod budget;
pub mod client;
mod db;
pub mod endpoints;
mod error;
mod logging;
mod password;
mod routing;
mod user;

pub use account::{Account, AccountRequest};
pub use app_state::AppState;
pub use auth::{
    ACCESS_TOKEN_DURATION, ACCESS_TOKEN_EXPIRES_IN, AuthError, AuthResponse, Claims,
    ForgotPasswordRequest, LogInRequest, REFRESH_TOKEN_DURATION, RefreshRequest, RefreshResponse,
    RegisterRequest, SuccessResponse, TOKEN_EXPIRED_CODE, TokenError, TokenKeys, TokenKind,
    UNAUTHORIZED_CODE, UpdateProfileRequest,
};
pub use budget::{Budget, BudgetRequest};
pub use db::initialize as initialize_db;
pub use error::Error;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use password::{PasswordHash, ValidatedPassword};
pub use routing::build_router;
pub use user::{UserID, UserProfile};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
