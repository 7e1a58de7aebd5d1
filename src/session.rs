//! Session store: who is signed in, and with which credentials.
//!
//! SYSTEM CONTEXT
//! ==============
//! One `SessionStore` is built at startup from persisted storage and handed
//! to the API client and the route guard. Clones share the same state.
//!
//! DESIGN
//! ======
//! Identity (`Session`) and credentials (`TokenPair`) live together behind one
//! lock and are persisted under `auth_user` / `auth_tokens`. A present session
//! always carries a non-empty access token; anything else on disk is treated
//! as signed out. `AuthState` transitions are published on a watch channel.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::storage::{AUTH_TOKENS_KEY, AUTH_USER_KEY, KeyValueStore, StorageError};

// =============================================================================
// TYPES
// =============================================================================

/// The signed-in principal. Persisted as `auth_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
}

/// Credential material. Persisted as `auth_tokens`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Everything a successful login hands to [`SessionStore::sign_in`].
#[derive(Clone, PartialEq, Eq)]
pub struct SignInPayload {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for SignInPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInPayload")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl SignInPayload {
    fn split(self) -> (Session, TokenPair) {
        let session = Session { user_id: self.user_id.clone(), email: self.email };
        let tokens = TokenPair {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id: self.user_id,
        };
        (session, tokens)
    }
}

/// Two-state auth machine. Both states are stable; the process moves between
/// them on sign-in, sign-out, and fatal refresh failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("access token must not be empty")]
    EmptyAccessToken,
    #[error("no active session")]
    SignedOut,
    /// A different sign-in replaced the one the refresh was issued for.
    #[error("session changed while the token was being refreshed")]
    Superseded,
    #[error("failed to encode session record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone)]
struct Credentials {
    session: Session,
    tokens: TokenPair,
    /// Which sign-in these credentials came from; 0 for a restored session.
    epoch: u64,
}

/// Refresh token snapshot, tied to the sign-in it was taken from.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub refresh_token: String,
    pub epoch: u64,
}

impl fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("refresh_token", &"<redacted>")
            .field("epoch", &self.epoch)
            .finish()
    }
}

struct SessionInner {
    store: Arc<dyn KeyValueStore>,
    state: RwLock<Option<Credentials>>,
    next_epoch: AtomicU64,
    auth_tx: watch::Sender<AuthState>,
}

/// Shared handle to the process-wide session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl SessionStore {
    /// Initialize from persisted storage. Missing, unreadable, or
    /// inconsistent records mean "signed out"; stray halves are removed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the storage backend itself fails.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, SessionError> {
        let credentials = read_credentials(store.as_ref())?;
        if credentials.is_none() {
            store.remove(AUTH_USER_KEY)?;
            store.remove(AUTH_TOKENS_KEY)?;
        }

        let initial = if credentials.is_some() { AuthState::Authenticated } else { AuthState::Unauthenticated };
        match &credentials {
            Some(c) => tracing::debug!(user_id = %c.session.user_id, "restored persisted session"),
            None => tracing::debug!("no persisted session"),
        }

        let (auth_tx, _) = watch::channel(initial);
        Ok(Self { inner: Arc::new(SessionInner {
                store,
                state: RwLock::new(credentials),
                next_epoch: AtomicU64::new(1),
                auth_tx,
            }) })
    }

    /// Store a fresh identity and token pair in memory and durable storage.
    ///
    /// # Errors
    ///
    /// Rejects an empty access token; propagates encode and storage failures.
    pub fn sign_in(&self, payload: SignInPayload) -> Result<(), SessionError> {
        if payload.access_token.is_empty() {
            return Err(SessionError::EmptyAccessToken);
        }
        let (session, tokens) = payload.split();
        let user_json = serde_json::to_string(&session)?;
        let tokens_json = serde_json::to_string(&tokens)?;

        let mut state = self.write_state();
        self.inner.store.set(AUTH_USER_KEY, &user_json)?;
        if let Err(e) = self.inner.store.set(AUTH_TOKENS_KEY, &tokens_json) {
            self.restore_user_record(state.as_ref());
            return Err(e.into());
        }
        tracing::info!(user_id = %session.user_id, email = %session.email, "signed in");
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        *state = Some(Credentials { session, tokens, epoch });
        drop(state);

        self.inner.auth_tx.send_replace(AuthState::Authenticated);
        Ok(())
    }

    /// Put `auth_user` back in step with the credentials still in memory.
    fn restore_user_record(&self, current: Option<&Credentials>) {
        let restored = match current {
            Some(c) => serde_json::to_string(&c.session)
                .map_err(SessionError::from)
                .and_then(|json| self.inner.store.set(AUTH_USER_KEY, &json).map_err(SessionError::from)),
            None => self.inner.store.remove(AUTH_USER_KEY).map_err(SessionError::from),
        };
        if let Err(e) = restored {
            tracing::error!(error = %e, "failed to restore auth_user after partial sign-in");
        }
    }

    /// Clear in-memory state and both persisted records.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure. Memory is cleared regardless.
    pub fn sign_out(&self) -> Result<(), SessionError> {
        let previous = self.clear()?;
        if let Some(c) = previous {
            tracing::info!(user_id = %c.session.user_id, "signed out");
        }
        Ok(())
    }

    /// Fatal credential path: the refresh token was rejected.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure. Memory is cleared regardless.
    pub fn expire(&self) -> Result<(), SessionError> {
        let previous = self.clear()?;
        if let Some(c) = previous {
            tracing::warn!(user_id = %c.session.user_id, "session expired, credentials cleared");
        }
        Ok(())
    }

    fn clear(&self) -> Result<Option<Credentials>, SessionError> {
        let mut state = self.write_state();
        let previous = state.take();
        let removed_user = self.inner.store.remove(AUTH_USER_KEY);
        let removed_tokens = self.inner.store.remove(AUTH_TOKENS_KEY);
        drop(state);

        self.inner.auth_tx.send_replace(AuthState::Unauthenticated);
        removed_user?;
        removed_tokens?;
        Ok(previous)
    }

    /// True iff a session exists and its access token is non-empty.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read_state()
            .as_ref()
            .is_some_and(|c| !c.tokens.access_token.is_empty())
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.read_state().as_ref().map(|c| c.session.clone())
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read_state()
            .as_ref()
            .map(|c| c.tokens.access_token.clone())
            .filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read_state()
            .as_ref()
            .map(|c| c.tokens.refresh_token.clone())
            .filter(|t| !t.is_empty())
    }

    /// Refresh token together with the sign-in it belongs to.
    #[must_use]
    pub fn refresh_grant(&self) -> Option<RefreshGrant> {
        self.read_state()
            .as_ref()
            .filter(|c| !c.tokens.refresh_token.is_empty())
            .map(|c| RefreshGrant { refresh_token: c.tokens.refresh_token.clone(), epoch: c.epoch })
    }

    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        *self.inner.auth_tx.borrow()
    }

    /// Watch `AuthState` transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.auth_tx.subscribe()
    }

    /// Replace the access token after a successful refresh. The refresh
    /// token is left untouched. Writes only if the sign-in `grant` was taken
    /// from is still the current one.
    ///
    /// # Errors
    ///
    /// `SignedOut` if the session was cleared while the refresh was in
    /// flight; `Superseded` if another sign-in replaced it.
    pub fn update_access_token(&self, grant: &RefreshGrant, access_token: &str) -> Result<(), SessionError> {
        if access_token.is_empty() {
            return Err(SessionError::EmptyAccessToken);
        }
        let mut state = self.write_state();
        let Some(credentials) = state.as_mut() else {
            return Err(SessionError::SignedOut);
        };
        if credentials.epoch != grant.epoch || credentials.tokens.refresh_token != grant.refresh_token {
            return Err(SessionError::Superseded);
        }
        let mut tokens = credentials.tokens.clone();
        tokens.access_token = access_token.to_owned();
        let tokens_json = serde_json::to_string(&tokens)?;
        self.inner.store.set(AUTH_TOKENS_KEY, &tokens_json)?;
        credentials.tokens = tokens;
        tracing::debug!(user_id = %credentials.session.user_id, "access token updated");
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Option<Credentials>> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Option<Credentials>> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &self.session())
            .field("auth_state", &self.auth_state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

fn read_credentials(store: &dyn KeyValueStore) -> Result<Option<Credentials>, StorageError> {
    let (Some(user_raw), Some(tokens_raw)) = (store.get(AUTH_USER_KEY)?, store.get(AUTH_TOKENS_KEY)?) else {
        return Ok(None);
    };
    Ok(parse_credentials(&user_raw, &tokens_raw))
}

fn parse_credentials(user_raw: &str, tokens_raw: &str) -> Option<Credentials> {
    let session = match serde_json::from_str::<Session>(user_raw) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "discarding unreadable auth_user record");
            return None;
        }
    };
    let tokens = match serde_json::from_str::<TokenPair>(tokens_raw) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(error = %e, "discarding unreadable auth_tokens record");
            return None;
        }
    };
    if tokens.access_token.is_empty() {
        tracing::warn!(user_id = %session.user_id, "discarding session without access token");
        return None;
    }
    if tokens.user_id != session.user_id {
        tracing::warn!(user_id = %session.user_id, token_user_id = %tokens.user_id, "discarding mismatched session records");
        return None;
    }
    Some(Credentials { session, tokens, epoch: 0 })
}
