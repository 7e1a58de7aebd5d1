//! API error type and response-envelope helpers.
//!
//! ENVELOPE
//! ========
//! The backend wraps payloads as `{ "data": { ... } }` but some endpoints
//! answer flat. Helpers here accept both and always look inside `data` first.

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::session::{SessionError, SignInPayload};

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by API client operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required field was empty; raised before any network call.
    #[error("{0} is required")]
    Validation(&'static str),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{}", status_display(.status, .message))]
    Status { status: u16, message: Option<String> },

    /// The refresh token was rejected; the session has been cleared.
    #[error("session expired: {0}")]
    RefreshFailed(String),

    /// The refresh endpoint could not be reached; credentials are kept.
    #[error("token refresh request failed: {0}")]
    RefreshTransport(String),

    /// A request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// A response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    /// HTTP status when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the caller should route to sign-in.
    #[must_use]
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Self::RefreshFailed(_) | Self::Status { status: 401, .. })
    }
}

#[allow(clippy::ref_option)]
fn status_display(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(m) => m.clone(),
        None => format!("request failed with status {status}. {GENERIC_FAILURE}"),
    }
}

// =============================================================================
// RESPONSE HELPERS
// =============================================================================

/// Turn a response into `T`, unwrapping the `data` envelope.
///
/// # Errors
///
/// Non-2xx statuses become [`ApiError::Status`] carrying the server's message
/// when it sent one; unparseable bodies become [`ApiError::Decode`].
pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let value = read_value(response).await?;
    serde_json::from_value(unwrap_data(value)).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Like [`read_json`] but returns the raw (enveloped) JSON value.
///
/// # Errors
///
/// See [`read_json`].
pub async fn read_value(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status { status: status.as_u16(), message: server_message(&text) });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Check the status only, discarding the body on success.
///
/// # Errors
///
/// Non-2xx statuses become [`ApiError::Status`].
pub async fn ensure_success(response: reqwest::Response) -> Result<(), ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let text = response.text().await?;
    Err(ApiError::Status { status: status.as_u16(), message: server_message(&text) })
}

/// Payload inside `{ "data": ... }`, or the value itself when flat.
#[must_use]
pub fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("data").is_some_and(|d| !d.is_null()) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Human-readable error text from an error body, if the server sent one.
#[must_use]
pub fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let candidates = [Some(&value), value.get("data")];
    candidates
        .into_iter()
        .flatten()
        .find_map(message_field)
}

fn message_field(value: &Value) -> Option<String> {
    ["message", "detail", "error"].iter().find_map(|key| match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Array(items) => items
            .iter()
            .find_map(Value::as_str)
            .map(str::to_owned),
        _ => None,
    })
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Access token from a refresh response.
///
/// Accepts `{"data":{"token"|"access_token"}}` and the flat
/// `{"token"|"access_token"|"accessToken"}` form.
///
/// # Errors
///
/// Returns a description when the body is not JSON or carries no token.
pub fn parse_refresh_token(body: &str) -> Result<String, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| format!("invalid refresh response: {e}"))?;
    let payload = unwrap_data(value);
    first_string(&payload, &["token", "access_token", "accessToken", "access"])
        .ok_or_else(|| "refresh response carried no access token".to_owned())
}

/// Sign-in payload from a login response.
///
/// Canonical envelope: `{"data":{"user_id","email","token","refresh_token"}}`.
/// The flat form is accepted too. `email` falls back to the submitted one.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] when the user id or access token is missing.
pub fn parse_login(body: &str, submitted_email: &str) -> Result<SignInPayload, ApiError> {
    let value: Value = serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    let payload = unwrap_data(value);

    let access_token = first_string(&payload, &["token", "access_token", "accessToken", "access"])
        .ok_or_else(|| ApiError::Decode("login response carried no access token".into()))?;
    let user_id = first_string(&payload, &["user_id", "userId", "id"])
        .ok_or_else(|| ApiError::Decode("login response carried no user id".into()))?;
    let refresh_token = first_string(&payload, &["refresh_token", "refreshToken", "refresh"]).unwrap_or_default();
    let email = first_string(&payload, &["email"]).unwrap_or_else(|| submitted_email.to_owned());

    Ok(SignInPayload { user_id, email, access_token, refresh_token })
}
