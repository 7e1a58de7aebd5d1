//! Authenticated HTTP client.
//!
//! ARCHITECTURE
//! ============
//! Every request goes to `base_url + path` with a JSON content type and, when
//! the session holds one, `Authorization: Bearer <access token>`. The token is
//! a snapshot read per attempt; the session store is the only writer.
//!
//! REFRESH
//! =======
//! A 401 with a refresh token on hand triggers one refresh and one retry of
//! the identical request. The refresh slot holds either nothing or a shared
//! handle to the pending refresh; callers that hit a 401 while it is pending
//! await that same handle instead of posting their own refresh. A 401 for a
//! token that has since been replaced is retried with the current token
//! without refreshing again.
//!
//! The refreshed token is written back only if the sign-in it was requested
//! for is still current; a newer sign-in is never overwritten.
//!
//! A rejected refresh is fatal for the session: credentials are cleared and
//! the navigator is sent to sign-in. An unreachable refresh endpoint is not;
//! the error surfaces and the credentials stay.

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;

use super::types::{ApiError, parse_refresh_token};
use crate::config::ClientConfig;
use crate::guard::Navigator;
use crate::session::{RefreshGrant, SessionStore};

pub const REFRESH_PATH: &str = "/auth/refresh/";

// =============================================================================
// REQUEST OPTIONS
// =============================================================================

/// Method, extra headers and an already-encoded body. Kept whole so the
/// request can be re-issued unchanged after a refresh.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl RequestOptions {
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self { method, ..Self::default() }
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Encode`] if serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_vec(body).map_err(ApiError::Encode)?);
        Ok(self)
    }
}

/// Defaults, then caller headers, then the bearer token.
pub(crate) fn merge_headers(caller: &HeaderMap, access_token: Option<&str>) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for name in caller.keys() {
        headers.remove(name);
        for value in caller.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    if let Some(token) = access_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

// =============================================================================
// REFRESH SLOT
// =============================================================================

/// Outcome shared by every caller attached to one refresh.
#[derive(Debug, Clone)]
enum RefreshFailure {
    Rejected(String),
    Unreachable(String),
}

impl From<RefreshFailure> for ApiError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Rejected(reason) => Self::RefreshFailed(reason),
            RefreshFailure::Unreachable(reason) => Self::RefreshTransport(reason),
        }
    }
}

type PendingRefresh = Shared<BoxFuture<'static, Result<String, RefreshFailure>>>;

struct InFlight {
    generation: u64,
    pending: PendingRefresh,
}

#[derive(Default)]
struct RefreshSlot {
    next_generation: u64,
    in_flight: Option<InFlight>,
}

/// Everything the refresh future needs, cloned so it does not own the client.
#[derive(Clone)]
struct RefreshContext {
    http: reqwest::Client,
    url: String,
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
}

// =============================================================================
// CLIENT
// =============================================================================

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
    refresh: Mutex<RefreshSlot>,
}

/// Cheap to clone; clones share the refresh slot.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig, session: SessionStore, navigator: Arc<dyn Navigator>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .build()?;
        tracing::debug!(base_url = %config.base_url, environment = ?config.environment, "api client initialized");
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: config.base_url.clone(),
                session,
                navigator,
                refresh: Mutex::new(RefreshSlot::default()),
            }),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    /// Underlying HTTP client, for diagnostics that must bypass auth and refresh.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Issue a request, recovering once from an expired access token.
    ///
    /// Returns the raw response; the body is not inspected. A 401 comes back
    /// unchanged when no refresh token is stored, and the retry's response
    /// comes back unchanged whatever its status.
    ///
    /// # Errors
    ///
    /// Transport failures are returned without retry. A failed refresh
    /// returns [`ApiError::RefreshFailed`] or [`ApiError::RefreshTransport`].
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Response, ApiError> {
        let url = self.url(path);
        let token = self.inner.session.access_token();
        let response = self.send(&url, &options, token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || self.inner.session.refresh_token().is_none() {
            return Ok(response);
        }

        // Token already replaced since this request went out: retry with it.
        let fresh = match self.inner.session.access_token() {
            Some(current) if token.as_deref() != Some(current.as_str()) => {
                tracing::debug!(path, method = %options.method, "401 with a superseded token, retrying with current");
                current
            }
            _ => {
                tracing::debug!(path, method = %options.method, "401 received, refreshing access token");
                self.refresh_access_token().await?
            }
        };
        self.send(&url, &options, Some(&fresh)).await
    }

    /// Issue a request with no bearer token and no refresh handling, for
    /// endpoints used before sign-in (login, password reset).
    ///
    /// # Errors
    ///
    /// Transport failures only; any status comes back as a response.
    pub async fn send_anonymous(&self, path: &str, options: RequestOptions) -> Result<Response, ApiError> {
        self.send(&self.url(path), &options, None).await
    }

    async fn send(&self, url: &str, options: &RequestOptions, token: Option<&str>) -> Result<Response, ApiError> {
        let headers = merge_headers(&options.headers, token)?;
        let mut builder = self
            .inner
            .http
            .request(options.method.clone(), url)
            .headers(headers);
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }
        builder.send().await.map_err(|e| {
            tracing::warn!(url, method = %options.method, error = %e, "api request failed");
            ApiError::Transport(e)
        })
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.request(path, RequestOptions::new(Method::GET)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.request(path, RequestOptions::new(Method::DELETE)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`]; also fails if `body` cannot be serialized.
    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, ApiError> {
        self.request(path, RequestOptions::new(Method::POST).json(body)?).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::post`].
    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, ApiError> {
        self.request(path, RequestOptions::new(Method::PUT).json(body)?).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::post`].
    pub async fn patch<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, ApiError> {
        self.request(path, RequestOptions::new(Method::PATCH).json(body)?).await
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// At most one refresh is in flight; concurrent callers share its result.
    ///
    /// # Errors
    ///
    /// [`ApiError::RefreshFailed`] when the server rejects the refresh (the
    /// session is cleared and the navigator redirected), or
    /// [`ApiError::RefreshTransport`] when the endpoint was unreachable.
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let (generation, pending) = self.join_or_start_refresh();
        let outcome = pending.await;

        let mut slot = self.refresh_slot();
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            slot.in_flight = None;
        }
        drop(slot);

        outcome.map_err(ApiError::from)
    }

    fn join_or_start_refresh(&self) -> (u64, PendingRefresh) {
        let mut slot = self.refresh_slot();
        if let Some(in_flight) = &slot.in_flight {
            tracing::debug!(generation = in_flight.generation, "joining in-flight token refresh");
            return (in_flight.generation, in_flight.pending.clone());
        }

        let generation = slot.next_generation;
        slot.next_generation += 1;
        let ctx = RefreshContext {
            http: self.inner.http.clone(),
            url: self.url(REFRESH_PATH),
            session: self.inner.session.clone(),
            navigator: Arc::clone(&self.inner.navigator),
        };
        let pending = run_refresh(ctx).boxed().shared();
        slot.in_flight = Some(InFlight { generation, pending: pending.clone() });
        tracing::debug!(generation, "starting token refresh");
        (generation, pending)
    }

    fn refresh_slot(&self) -> MutexGuard<'_, RefreshSlot> {
        self.inner.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// REFRESH PROCEDURE
// =============================================================================

async fn run_refresh(ctx: RefreshContext) -> Result<String, RefreshFailure> {
    let outcome = match ctx.session.refresh_grant() {
        Some(grant) => request_new_access_token(&ctx, &grant).await.map(|token| (grant, token)),
        None => Err(RefreshFailure::Rejected("no refresh token available".into())),
    };
    match outcome {
        Ok((grant, token)) => {
            if let Err(e) = ctx.session.update_access_token(&grant, &token) {
                tracing::warn!(error = %e, "refreshed token discarded");
                return Err(RefreshFailure::Rejected(e.to_string()));
            }
            tracing::info!("access token refreshed");
            Ok(token)
        }
        Err(RefreshFailure::Rejected(reason)) => {
            tracing::warn!(%reason, "token refresh rejected, signing out");
            if let Err(e) = ctx.session.expire() {
                tracing::error!(error = %e, "failed to clear stored credentials");
            }
            ctx.navigator.redirect_to_sign_in(None);
            Err(RefreshFailure::Rejected(reason))
        }
        Err(RefreshFailure::Unreachable(reason)) => {
            tracing::warn!(%reason, "token refresh endpoint unreachable");
            Err(RefreshFailure::Unreachable(reason))
        }
    }
}

async fn request_new_access_token(ctx: &RefreshContext, grant: &RefreshGrant) -> Result<String, RefreshFailure> {
    let response = ctx
        .http
        .post(&ctx.url)
        .header(CONTENT_TYPE, "application/json")
        .json(&serde_json::json!({ "refresh": grant.refresh_token }))
        .send()
        .await
        .map_err(|e| RefreshFailure::Unreachable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RefreshFailure::Rejected(format!("refresh endpoint returned {}", status.as_u16())));
    }
    let body = response
        .text()
        .await
        .map_err(|e| RefreshFailure::Unreachable(e.to_string()))?;
    parse_refresh_token(&body).map_err(RefreshFailure::Rejected)
}
