//! Session lifecycle: login, token validation, single-flight refresh, logout.
//!
//! `SessionManager` is the only owner of the current token pair. Every
//! authenticated request goes through [`SessionManager::with_auth`], which
//! asks [`SessionManager::get_valid_access_token`] for a usable token first.
//!
//! While a refresh is running, its result lives in one shared slot. Every
//! caller that needs a token in the meantime awaits that slot instead of
//! starting its own refresh.
//!
//! Keychain calls run on tokio's blocking pool while the session lock is
//! held, so memory and storage change together.

use std::sync::{Arc, Weak};

use anyhow::Context;
use chrono::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{RequestBuilder, Response};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};

use super::error::AuthError;
use super::session::{Session, SessionStatus, TokenPair};
use super::store::{TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use super::validation::RegistrationProfile;

/// Seconds a freshly issued or verified access token is used without
/// asking the verification endpoint again.
pub const DEFAULT_TRUST_SECS: u64 = 30;

type RefreshOutcome = Result<String, AuthError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The single refresh slot.
struct RefreshSlot {
    /// Access token this refresh replaces
    replaces: String,
    outcome: PendingRefresh,
}

struct SessionState {
    session: Session,
    /// Bumped by login, logout and restore so a refresh started for an older
    /// session cannot overwrite a newer one.
    epoch: u64,
    refresh: Option<RefreshSlot>,
}

impl SessionState {
    fn reset(&mut self, session: Session) {
        self.epoch += 1;
        self.refresh = None;
        self.session = session;
    }
}

enum Next {
    Join(PendingRefresh),
    Verify { tokens: TokenPair, epoch: u64 },
}

/// Owner of the current session.
/// Clone is cheap - all clones share one session and one refresh slot.
#[derive(Clone)]
pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    state: Arc<Mutex<SessionState>>,
    trust_window: Duration,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            store,
            state: Arc::new(Mutex::new(SessionState {
                session: Session::new(),
                epoch: 0,
                refresh: None,
            })),
            trust_window: Duration::seconds(DEFAULT_TRUST_SECS as i64),
        }
    }

    /// How long a token issued or verified by the server is used without
    /// re-verification. Zero verifies on every call.
    pub fn with_trust_window(mut self, window: std::time::Duration) -> Self {
        self.trust_window = Duration::from_std(window).unwrap_or_else(|_| Duration::zero());
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Snapshot of the current session
    pub async fn session(&self) -> Session {
        self.state.lock().await.session.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.session.status()
    }

    /// Load a pair persisted by an earlier run. A half pair is discarded.
    pub async fn restore(&self) -> Result<SessionStatus, AuthError> {
        let mut state = self.state.lock().await;
        let (access, refresh) = with_store(&self.store, |store| {
            Ok((store.load(ACCESS_TOKEN_KEY)?, store.load(REFRESH_TOKEN_KEY)?))
        })
        .await
        .map_err(AuthError::storage)?;

        match (access, refresh) {
            (Some(access), Some(refresh)) => {
                debug!("Restored session from secure storage");
                state.reset(Session::restored(TokenPair { access, refresh }));
            }
            (None, None) => debug!("No stored session"),
            _ => {
                warn!("Secure storage held only one token, discarding it");
                clear_tokens(&self.store).await.map_err(AuthError::storage)?;
            }
        }
        Ok(state.session.status())
    }

    /// Exchange credentials for a token pair and persist it.
    ///
    /// On failure the previous session, in memory and in storage, is kept.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim().to_lowercase();

        let tokens = self.api.login(&email, password).await.map_err(|e| match e {
            e if e.is_transport() => AuthError::from(e),
            e @ ApiError::UnexpectedBody(_) => AuthError::Api(e),
            e => {
                debug!(error = %e, "Login rejected");
                AuthError::InvalidCredentials
            }
        })?;

        let mut state = self.state.lock().await;
        if let Err(e) = persist_pair(&self.store, tokens.clone()).await {
            warn!(error = %e, "Failed to persist tokens after login");
            let rollback = match state.session.tokens() {
                Some(previous) => persist_pair(&self.store, previous.clone()).await,
                None => clear_tokens(&self.store).await,
            };
            if let Err(e) = rollback {
                warn!(error = %e, "Failed to restore previous tokens in storage");
            }
            return Err(AuthError::storage(e));
        }

        state.reset(Session::authenticated(tokens));
        info!("Logged in");
        Ok(state.session.clone())
    }

    /// Create an account. Local validation runs first; an invalid profile
    /// never reaches the network.
    pub async fn register(&self, profile: &RegistrationProfile) -> Result<(), AuthError> {
        profile.validate()?;
        self.api.register(&profile.normalized()).await?;
        info!("Account registered");
        Ok(())
    }

    /// Return an access token the server accepts, refreshing it if needed.
    ///
    /// At most one refresh runs at a time. Callers arriving while it runs, or
    /// whose verification failed for the token it replaces, receive its
    /// result rather than refreshing again.
    pub async fn get_valid_access_token(&self) -> Result<String, AuthError> {
        loop {
            let next = {
                let state = self.state.lock().await;
                let Some(tokens) = state.session.tokens() else {
                    return Err(AuthError::Unauthenticated);
                };
                match &state.refresh {
                    Some(slot) if state.session.status() == SessionStatus::Refreshing => {
                        Next::Join(slot.outcome.clone())
                    }
                    _ if state.session.is_trusted(self.trust_window) => {
                        return Ok(tokens.access.clone());
                    }
                    _ => Next::Verify {
                        tokens: tokens.clone(),
                        epoch: state.epoch,
                    },
                }
            };

            let (tokens, epoch) = match next {
                Next::Join(outcome) => {
                    debug!("Waiting for in-flight token refresh");
                    return outcome.await;
                }
                Next::Verify { tokens, epoch } => (tokens, epoch),
            };

            if self.api.verify_token(&tokens.access).await? {
                let mut state = self.state.lock().await;
                if state.epoch == epoch && state.session.access_token() == Some(tokens.access.as_str()) {
                    state.session.mark_validated();
                }
                return Ok(tokens.access);
            }
            debug!("Access token rejected by verification endpoint");

            let outcome = {
                let mut state = self.state.lock().await;
                if state.epoch != epoch {
                    // Logged in or out meanwhile
                    continue;
                }
                let joined = match &state.refresh {
                    Some(slot) if slot.replaces == tokens.access => Some(slot.outcome.clone()),
                    _ => None,
                };
                let current = state.session.access_token().map(str::to_string);
                match (joined, current) {
                    (Some(outcome), _) => outcome,
                    (None, None) => return Err(AuthError::Unauthenticated),
                    // Already replaced by a refresh that finished before we asked
                    (None, Some(current)) if current != tokens.access => return Ok(current),
                    (None, Some(_)) => self.begin_refresh(&mut state, tokens),
                }
            };
            return outcome.await;
        }
    }

    /// Send a request built from the shared client with the bearer token of
    /// a valid session. The request is sent exactly once; a non-2xx answer
    /// comes back as `AuthError::Api` with the status classified.
    ///
    /// A 401 is not retried, but the token loses its trust so the next
    /// caller verifies it and refreshes if the server has revoked it.
    pub async fn with_auth<F>(&self, build: F) -> Result<Response, AuthError>
    where
        F: FnOnce(&ApiClient) -> RequestBuilder,
    {
        let token = self.get_valid_access_token().await?;
        let response = build(&self.api)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ApiError::from)?;

        match ApiClient::check_response(response).await {
            Ok(response) => Ok(response),
            Err(ApiError::Unauthorized) => {
                let mut state = self.state.lock().await;
                if state.session.access_token() == Some(token.as_str()) {
                    debug!("Request unauthorized, access token will be verified again");
                    state.session.clear_validation();
                }
                Err(ApiError::Unauthorized.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Forget the session locally and delete both tokens from storage.
    /// Memory is reset even when storage fails.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        state.reset(Session::new());
        clear_tokens(&self.store).await.map_err(AuthError::storage)?;
        info!("Logged out");
        Ok(())
    }

    /// Fill the refresh slot. Called with the session lock held.
    fn begin_refresh(&self, state: &mut SessionState, tokens: TokenPair) -> PendingRefresh {
        let TokenPair { access: stale, refresh } = tokens;
        let outcome = run_refresh(
            self.api.clone(),
            Arc::clone(&self.store),
            Arc::downgrade(&self.state),
            state.epoch,
            refresh,
        )
        .boxed()
        .shared();

        state.session.set_status(SessionStatus::Refreshing);
        state.refresh = Some(RefreshSlot {
            replaces: stale,
            outcome: outcome.clone(),
        });
        outcome
    }
}

/// Body of the shared refresh future. Holds the state weakly: the state owns
/// the slot that owns this future.
async fn run_refresh(
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    state: Weak<Mutex<SessionState>>,
    epoch: u64,
    refresh: String,
) -> RefreshOutcome {
    info!("Refreshing access token");
    let minted = api.refresh_token(&refresh).await;

    let Some(shared) = state.upgrade() else {
        return Err(AuthError::Unauthenticated);
    };
    let mut state = shared.lock().await;

    if state.epoch != epoch {
        debug!("Session replaced during refresh, discarding result");
        return state
            .session
            .access_token()
            .map(str::to_string)
            .ok_or(AuthError::Unauthenticated);
    }

    match minted {
        Ok(access) => {
            let saved = access.clone();
            let persisted = with_store(&store, move |store| {
                store
                    .save(ACCESS_TOKEN_KEY, &saved)
                    .context("Failed to store refreshed access token")
            })
            .await;
            if let Err(e) = persisted {
                warn!(error = %e, "Keeping previous tokens");
                state.session.set_status(SessionStatus::Authenticated);
                state.refresh = None;
                return Err(AuthError::storage(e));
            }
            state.session.replace_access(access.clone());
            info!("Access token refreshed");
            Ok(access)
        }
        Err(e) if e.is_transport() => {
            warn!(error = %e, "Token refresh did not reach the server");
            state.session.set_status(SessionStatus::Authenticated);
            state.refresh = None;
            Err(e.into())
        }
        Err(e) => {
            warn!(error = %e, "Token refresh rejected, session expired");
            state.session = Session::expired();
            if let Err(e) = clear_tokens(&store).await {
                warn!(error = %e, "Failed to delete expired tokens from storage");
            }
            Err(AuthError::SessionExpired)
        }
    }
}

/// Run a storage operation on the blocking pool.
async fn with_store<T, F>(store: &Arc<dyn TokenStore>, op: F) -> anyhow::Result<T>
where
    F: FnOnce(&dyn TokenStore) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .context("Token storage task failed")?
}

async fn persist_pair(store: &Arc<dyn TokenStore>, tokens: TokenPair) -> anyhow::Result<()> {
    with_store(store, move |store| {
        store
            .save(ACCESS_TOKEN_KEY, &tokens.access)
            .context("Failed to store access token")?;
        store
            .save(REFRESH_TOKEN_KEY, &tokens.refresh)
            .context("Failed to store refresh token")?;
        Ok(())
    })
    .await
}

/// Delete both keys, attempting the second even if the first fails.
async fn clear_tokens(store: &Arc<dyn TokenStore>) -> anyhow::Result<()> {
    with_store(store, |store| {
        let access = store.delete(ACCESS_TOKEN_KEY);
        let refresh = store.delete(REFRESH_TOKEN_KEY);
        access.and(refresh)
    })
    .await
}
