//! The wallet API client.
//!
//! Every request goes through [ApiClient::send], which attaches the current
//! access token. When the server answers that the token has expired, the
//! client refreshes it and sends the request once more. Requests that find
//! their token expired while a refresh is already running wait for that
//! refresh instead of starting their own, so there is at most one refresh in
//! flight per client.
//!
//! If the refresh fails the session is over: the [TokenStore] is cleared, the
//! login hook is called and every waiting request gets the refresh error.

mod auth;
mod coordinator;
mod error;
mod finance;
mod storage;
mod token_store;
mod transport;

use std::{fmt, sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};

pub use coordinator::{RefreshCoordinator, RefreshFlight, RefreshOutcome, Ticket};
pub use error::{ClientError, RefreshError};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use token_store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, Session, TokenStore, USER_KEY};
pub use transport::{ApiRequest, ApiResponse, AuthService, HttpTransport, Transport};

/// The API base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// The request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Called when the session has ended and the user must log in again.
pub type LoginRedirect = Arc<dyn Fn() + Send + Sync>;

/// The wallet API client.
///
/// Clones share the same session and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    auth_service: Arc<dyn AuthService>,
    token_store: Arc<TokenStore>,
    coordinator: RefreshCoordinator,
    on_login_required: LoginRedirect,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("session", &self.inner.token_store.session())
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}

/// Which send of a request this is. A request is sent at most twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

enum Reply {
    Done(ApiResponse),
    Expired(ApiResponse),
}

impl ApiClient {
    /// Create a client for the API at `base_url` with an empty, in-memory session.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// The session of this client.
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.inner.token_store
    }

    /// Send `request` with the current access token.
    ///
    /// If the token has expired it is refreshed and the request is sent once
    /// more. Callers cannot tell whether that happened.
    ///
    /// # Errors
    ///
    /// - [ClientError::Status] for any non-success response other than an expired token.
    /// - [ClientError::SessionExpired] if the request was rejected as
    ///   unauthenticated and there was no refresh token, in which case the
    ///   session is cleared and the login hook has been called. Also returned
    ///   if the request was rejected again after the refresh; that leaves the
    ///   session as it is and does not call the login hook.
    /// - [ClientError::Refresh] if the refresh failed. The session is cleared
    ///   and the login hook has been called.
    /// - [ClientError::Request] if the server could not be reached.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let access_token = self.inner.token_store.access_token();

        let expired = match self
            .attempt(&request, access_token.as_deref(), Attempt::First)
            .await?
        {
            Reply::Done(response) => return response.error_for_status(),
            Reply::Expired(response) => response,
        };

        let access_token = self.recover(access_token, &expired).await?;

        match self
            .attempt(&request, Some(&access_token), Attempt::Retry)
            .await?
        {
            Reply::Done(response) => response.error_for_status(),
            Reply::Expired(response) => {
                tracing::warn!(path = %request.path, "request rejected again with a fresh access token");
                Err(session_expired(&response))
            }
        }
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
        attempt: Attempt,
    ) -> Result<Reply, ClientError> {
        let response = self.inner.transport.execute(request, access_token).await?;

        if response.is_authentication_expired(access_token.is_some()) {
            tracing::debug!(?attempt, method = %request.method, path = %request.path, "access token expired");
            Ok(Reply::Expired(response))
        } else {
            Ok(Reply::Done(response))
        }
    }

    /// Get an access token to retry with after `used_token` was rejected as expired.
    async fn recover(
        &self,
        used_token: Option<String>,
        expired: &ApiResponse,
    ) -> Result<String, ClientError> {
        let token_store = &self.inner.token_store;
        let coordinator = &self.inner.coordinator;

        if let Some(current_token) = token_store.access_token() {
            if used_token.as_ref() != Some(&current_token) && coordinator.is_idle() {
                tracing::debug!("access token was refreshed while the request was in flight");
                return Ok(current_token);
            }
        }

        // Join before reading the refresh token: a failing refresh clears the
        // store before it settles, and its followers must get its error.
        match coordinator.join() {
            Ticket::Follower(receiver) => {
                tracing::debug!("waiting for the refresh in flight");
                let outcome = receiver.await.unwrap_or(Err(RefreshError::Abandoned));
                Ok(outcome?)
            }
            Ticket::Leader(flight) => match token_store.refresh_token() {
                Some(refresh_token) => self.refresh(flight, &refresh_token).await,
                None => {
                    tracing::info!("access token expired and there is no refresh token, ending session");
                    self.clear_session();
                    flight.settle(Err(RefreshError::MissingToken));
                    (self.inner.on_login_required)();
                    Err(session_expired(expired))
                }
            },
        }
    }

    async fn refresh(
        &self,
        flight: RefreshFlight<'_>,
        refresh_token: &str,
    ) -> Result<String, ClientError> {
        tracing::info!("refreshing access token");

        match self.inner.auth_service.refresh(refresh_token).await {
            Ok(grant) => {
                if let Err(error) = self.inner.token_store.set_access_token(&grant.access_token) {
                    tracing::warn!("could not store the refreshed access token: {error}");
                }

                let resumed = flight.settle(Ok(grant.access_token.clone()));
                tracing::info!(resumed, "access token refreshed");

                Ok(grant.access_token)
            }
            Err(error) => {
                tracing::warn!("could not refresh access token: {error}");
                self.clear_session();

                let rejected = flight.settle(Err(error.clone()));
                tracing::debug!(rejected, "rejected requests waiting on the refresh");

                (self.inner.on_login_required)();

                Err(ClientError::Refresh(error))
            }
        }
    }

    fn clear_session(&self) {
        if let Err(error) = self.inner.token_store.logout() {
            tracing::warn!("could not clear the stored session: {error}");
        }
    }

    /// Send a request without an access token and without refreshing.
    ///
    /// Used for the auth endpoints that establish a session.
    async fn send_unauthenticated(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        self.inner
            .transport
            .execute(&request, None)
            .await?
            .error_for_status()
    }

    /// `GET` `path` and parse the response body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// `POST` `body` to `path` and parse the response body.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path, &body)?).await?.json()
    }

    /// `PUT` `body` to `path` and parse the response body.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path, &body)?).await?.json()
    }

    /// `DELETE` `path`.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(ApiRequest::delete(path)).await
    }
}

fn session_expired(response: &ApiResponse) -> ClientError {
    let message = error::ErrorBody::parse(&response.body).into_message("Unauthorized");
    ClientError::SessionExpired(message)
}

/// Builder for [ApiClient]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    token_store: Option<Arc<TokenStore>>,
    on_login_required: Option<LoginRedirect>,
    transport: Option<Arc<dyn Transport>>,
    auth_service: Option<Arc<dyn AuthService>>,
}

impl ApiClientBuilder {
    /// Set the API base URL, defaults to [DEFAULT_BASE_URL].
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout, defaults to [DEFAULT_TIMEOUT].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the session store, defaults to a store that only keeps the session in memory.
    pub fn token_store(mut self, token_store: Arc<TokenStore>) -> Self {
        self.token_store = Some(token_store);
        self
    }

    /// Set the hook called when the session has ended and the user must log in again.
    pub fn on_login_required(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_login_required = Some(Arc::new(hook));
        self
    }

    /// Send API requests with `transport` instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Refresh tokens with `auth_service` instead of HTTP.
    pub fn auth_service(mut self, auth_service: Arc<dyn AuthService>) -> Self {
        self.auth_service = Some(auth_service);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::Configuration(format!(
                "base URL must start with http:// or https://, got {base_url:?}"
            )));
        }

        let (transport, auth_service): (Arc<dyn Transport>, Arc<dyn AuthService>) =
            match (self.transport, self.auth_service) {
                (Some(transport), Some(auth_service)) => (transport, auth_service),
                (transport, auth_service) => {
                    let http = Arc::new(HttpTransport::new(
                        base_url,
                        self.timeout.unwrap_or(DEFAULT_TIMEOUT),
                    )?);

                    let transport: Arc<dyn Transport> = match transport {
                        Some(transport) => transport,
                        None => http.clone(),
                    };
                    let auth_service: Arc<dyn AuthService> = match auth_service {
                        Some(auth_service) => auth_service,
                        None => http,
                    };

                    (transport, auth_service)
                }
            };

        let token_store = self.token_store.unwrap_or_else(|| {
            Arc::new(TokenStore::load(
                Arc::new(MemoryStorage::new()),
                Arc::new(MemoryStorage::new()),
            ))
        });

        let on_login_required = self.on_login_required.unwrap_or_else(|| {
            Arc::new(|| tracing::info!("session ended, log in again to continue"))
        });

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                transport,
                auth_service,
                token_store,
                coordinator: RefreshCoordinator::new(),
                on_login_required,
            }),
        })
    }
}
