//! The client's record of the current session: tokens and the user they belong to.
//!
//! The access token and user are kept in the session scope and the refresh
//! token in the durable scope, so a new process can restore the session by
//! refreshing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    UserProfile,
    client::storage::{Storage, StorageError},
};

/// The storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "wallet_access_token";
/// The storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "wallet_refresh_token";
/// The storage key for the user, stored as JSON.
pub const USER_KEY: &str = "wallet_user";

/// The authentication state of the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// The short-lived token sent with every request.
    pub access_token: Option<String>,
    /// The long-lived token used to get a new access token.
    pub refresh_token: Option<String>,
    /// The logged in user.
    pub user: Option<UserProfile>,
}

impl Session {
    /// Whether both an access token and a user are present.
    pub fn is_logged_in(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }
}

/// Holds the live [Session] and mirrors it to its storage scopes.
///
/// The in-memory session is authoritative. Storage write failures are
/// returned to the caller after memory has been updated.
pub struct TokenStore {
    session: Mutex<Session>,
    session_storage: Arc<dyn Storage>,
    durable_storage: Arc<dyn Storage>,
}

impl TokenStore {
    /// Restore the session from `session_storage` and `durable_storage`.
    ///
    /// Unreadable values are logged and treated as absent.
    pub fn load(session_storage: Arc<dyn Storage>, durable_storage: Arc<dyn Storage>) -> Self {
        let access_token = read_logged(session_storage.as_ref(), ACCESS_TOKEN_KEY);
        let refresh_token = read_logged(durable_storage.as_ref(), REFRESH_TOKEN_KEY);
        let user = read_logged(session_storage.as_ref(), USER_KEY).and_then(|user_json| {
            serde_json::from_str::<UserProfile>(&user_json)
                .inspect_err(|error| tracing::warn!("ignoring stored user: {error}"))
                .ok()
        });

        Self {
            session: Mutex::new(Session {
                access_token,
                refresh_token,
                user,
            }),
            session_storage,
            durable_storage,
        }
    }

    fn session_lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A snapshot of the live session.
    pub fn session(&self) -> Session {
        self.session_lock().clone()
    }

    /// The current access token.
    pub fn access_token(&self) -> Option<String> {
        self.session_lock().access_token.clone()
    }

    /// The logged in user.
    pub fn user(&self) -> Option<UserProfile> {
        self.session_lock().user.clone()
    }

    /// See [Session::is_logged_in].
    pub fn is_logged_in(&self) -> bool {
        self.session_lock().is_logged_in()
    }

    /// The refresh token from the live session, or from durable storage if
    /// the live session has none.
    pub fn refresh_token(&self) -> Option<String> {
        if let Some(refresh_token) = self.session_lock().refresh_token.clone() {
            return Some(refresh_token);
        }

        read_logged(self.durable_storage.as_ref(), REFRESH_TOKEN_KEY)
    }

    /// Establish a new session after logging in or registering.
    pub fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        user: UserProfile,
    ) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(&user).map_err(|source| StorageError::Corrupt {
            path: USER_KEY.into(),
            source,
        })?;

        *self.session_lock() = Session {
            access_token: Some(access_token.to_owned()),
            refresh_token: Some(refresh_token.to_owned()),
            user: Some(user),
        };

        self.session_storage.set(ACCESS_TOKEN_KEY, access_token)?;
        self.durable_storage.set(REFRESH_TOKEN_KEY, refresh_token)?;
        self.session_storage.set(USER_KEY, &user_json)
    }

    /// Replace the access token after a refresh.
    pub fn set_access_token(&self, access_token: &str) -> Result<(), StorageError> {
        self.session_lock().access_token = Some(access_token.to_owned());
        self.session_storage.set(ACCESS_TOKEN_KEY, access_token)
    }

    /// Replace the logged in user, e.g. after a profile update.
    pub fn set_user(&self, user: UserProfile) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(&user).map_err(|source| StorageError::Corrupt {
            path: USER_KEY.into(),
            source,
        })?;

        self.session_lock().user = Some(user);
        self.session_storage.set(USER_KEY, &user_json)
    }

    /// Forget the session in memory and in every storage scope.
    ///
    /// Every key is removed even if removing an earlier one fails; the first
    /// failure is returned.
    pub fn logout(&self) -> Result<(), StorageError> {
        *self.session_lock() = Session::default();

        let results = [
            self.session_storage.remove(ACCESS_TOKEN_KEY),
            self.session_storage.remove(USER_KEY),
            self.durable_storage.remove(REFRESH_TOKEN_KEY),
        ];

        results.into_iter().collect()
    }
}

fn read_logged(storage: &dyn Storage, key: &str) -> Option<String> {
    storage
        .get(key)
        .inspect_err(|error| tracing::warn!("could not read {key}: {error}"))
        .ok()
        .flatten()
}
