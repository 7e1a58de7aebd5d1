//! Auth endpoints: login, OTP password reset, profile, password change.
//!
//! Required fields are validated locally; a request with an empty field
//! never reaches the network. Pre-sign-in endpoints go out without a bearer
//! token and never trigger a refresh.

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::client::{ApiClient, RequestOptions};
use super::types::{ApiError, ensure_success, parse_login, read_json, read_value, server_message, unwrap_data};
use crate::session::Session;

pub const LOGIN_PATH: &str = "/auth/login/";
pub const SEND_OTP_PATH: &str = "/auth/send-otp/";
pub const VERIFY_OTP_PATH: &str = "/auth/verify-otp/";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password/";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password/";
pub const PROFILE_PATH: &str = "/dashboard/settings/profile/";

pub const MIN_PASSWORD_LEN: usize = 6;

// =============================================================================
// VALIDATION
// =============================================================================

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation(field));
    }
    Ok(trimmed)
}

/// New-password rules shared by reset and change flows.
pub(crate) fn check_new_password(new_password: &str, confirm: &str) -> Result<(), ApiError> {
    required("new password", new_password)?;
    required("password confirmation", confirm)?;
    if new_password != confirm {
        return Err(ApiError::PasswordMismatch);
    }
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }
    Ok(())
}

async fn post_anonymous<T: Serialize + ?Sized>(client: &ApiClient, path: &str, body: &T) -> Result<Response, ApiError> {
    client
        .send_anonymous(path, RequestOptions::new(Method::POST).json(body)?)
        .await
}

// =============================================================================
// LOGIN
// =============================================================================

/// `POST /auth/login/`, then sign the session in.
///
/// # Errors
///
/// Validation errors for empty fields, [`ApiError::Status`] with the server's
/// message on rejection, [`ApiError::Decode`] for an unexpected payload.
pub async fn login(client: &ApiClient, email: &str, password: &str) -> Result<Session, ApiError> {
    let email = required("email", email)?;
    if password.is_empty() {
        return Err(ApiError::Validation("password"));
    }

    let response = post_anonymous(client, LOGIN_PATH, &json!({ "email": email, "password": password })).await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        tracing::info!(email, status = status.as_u16(), "login rejected");
        return Err(ApiError::Status { status: status.as_u16(), message: server_message(&body) });
    }

    let payload = parse_login(&body, email)?;
    let session = Session { user_id: payload.user_id.clone(), email: payload.email.clone() };
    client.session().sign_in(payload)?;
    Ok(session)
}

// =============================================================================
// PASSWORD RESET (OTP)
// =============================================================================

/// `POST /auth/send-otp/`.
///
/// # Errors
///
/// Validation error for an empty email; [`ApiError::Status`] on rejection.
pub async fn send_otp(client: &ApiClient, email: &str) -> Result<(), ApiError> {
    let email = required("email", email)?;
    let response = post_anonymous(client, SEND_OTP_PATH, &json!({ "email": email })).await?;
    ensure_success(response).await?;
    tracing::info!(email, "password reset code sent");
    Ok(())
}

/// `POST /auth/verify-otp/`. Returns the reset token when the server issues one.
///
/// # Errors
///
/// Validation errors for empty fields; [`ApiError::Status`] on rejection.
pub async fn verify_otp(client: &ApiClient, email: &str, otp: &str) -> Result<Option<String>, ApiError> {
    let email = required("email", email)?;
    let otp = required("otp", otp)?;
    let response = post_anonymous(client, VERIFY_OTP_PATH, &json!({ "email": email, "otp": otp })).await?;
    let value = unwrap_data(read_value(response).await?);
    let token = ["token", "reset_token", "resetToken"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .filter(|t| !t.is_empty())
        .map(str::to_owned);
    Ok(token)
}

/// `POST /auth/reset-password/`.
///
/// # Errors
///
/// Validation errors for empty or mismatched passwords; [`ApiError::Status`]
/// on rejection.
pub async fn reset_password(
    client: &ApiClient,
    email: &str,
    token: Option<&str>,
    new_password: &str,
    confirm: &str,
) -> Result<(), ApiError> {
    let email = required("email", email)?;
    check_new_password(new_password, confirm)?;

    let mut body = Map::new();
    body.insert("email".into(), json!(email));
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        body.insert("token".into(), json!(token));
    }
    body.insert("new_password".into(), json!(new_password));

    let response = post_anonymous(client, RESET_PASSWORD_PATH, &body).await?;
    ensure_success(response).await?;
    tracing::info!(email, "password reset");
    Ok(())
}

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// `GET /dashboard/settings/profile/`.
///
/// # Errors
///
/// See [`read_json`].
pub async fn profile(client: &ApiClient) -> Result<Profile, ApiError> {
    read_json(client.get(PROFILE_PATH).await?).await
}

/// `PATCH /dashboard/settings/profile/` with only the provided fields.
///
/// # Errors
///
/// Validation error when nothing would change; otherwise see [`read_json`].
pub async fn update_profile(client: &ApiClient, update: &ProfileUpdate) -> Result<Profile, ApiError> {
    if update.is_empty() {
        return Err(ApiError::Validation("name or email"));
    }
    if let Some(name) = &update.name {
        required("name", name)?;
    }
    if let Some(email) = &update.email {
        required("email", email)?;
    }
    read_json(client.patch(PROFILE_PATH, update).await?).await
}

/// `POST /auth/change-password/`.
///
/// # Errors
///
/// Validation errors for empty, short, or mismatched passwords;
/// [`ApiError::Status`] on rejection.
pub async fn change_password(
    client: &ApiClient,
    current_password: &str,
    new_password: &str,
    confirm: &str,
) -> Result<(), ApiError> {
    if current_password.trim().is_empty() {
        return Err(ApiError::Validation("current password"));
    }
    check_new_password(new_password, confirm)?;

    let response = client
        .post(
            CHANGE_PASSWORD_PATH,
            &json!({ "current_password": current_password, "new_password": new_password }),
        )
        .await?;
    ensure_success(response).await?;
    tracing::info!("password changed");
    Ok(())
}
