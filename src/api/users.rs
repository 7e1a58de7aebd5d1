//! User management endpoints under `/users/`.

#[cfg(test)]
#[path = "users_test.rs"]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::client::ApiClient;
use super::types::{ApiError, ensure_success, read_json};

pub const USERS_PATH: &str = "/users/";

/// Backend user ids arrive as numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(u64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Fields this client does not interpret (subscription, usage, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body for create and update. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserInput {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.status.is_none() && self.extra.is_empty()
    }
}

fn user_path(id: &str) -> Result<String, ApiError> {
    let id = id.trim().trim_matches('/');
    if id.is_empty() || id.contains('/') {
        return Err(ApiError::Validation("user id"));
    }
    Ok(format!("{USERS_PATH}{id}/"))
}

/// `GET /users/`.
///
/// # Errors
///
/// See [`read_json`].
pub async fn list(client: &ApiClient) -> Result<Vec<User>, ApiError> {
    read_json(client.get(USERS_PATH).await?).await
}

/// `POST /users/`.
///
/// # Errors
///
/// Validation error for an empty body; otherwise see [`read_json`].
pub async fn create(client: &ApiClient, input: &UserInput) -> Result<User, ApiError> {
    if input.is_empty() {
        return Err(ApiError::Validation("user fields"));
    }
    let user: User = read_json(client.post(USERS_PATH, input).await?).await?;
    tracing::info!(user_id = %user.id, "user created");
    Ok(user)
}

/// `PUT /users/{id}/`.
///
/// # Errors
///
/// Validation error for an empty id or body; otherwise see [`read_json`].
pub async fn update(client: &ApiClient, id: &str, input: &UserInput) -> Result<User, ApiError> {
    let path = user_path(id)?;
    if input.is_empty() {
        return Err(ApiError::Validation("user fields"));
    }
    let user = read_json(client.put(&path, input).await?).await?;
    tracing::info!(user_id = id, "user updated");
    Ok(user)
}

/// `DELETE /users/{id}/`.
///
/// # Errors
///
/// Validation error for an empty id; [`ApiError::Status`] on rejection.
pub async fn delete(client: &ApiClient, id: &str) -> Result<(), ApiError> {
    let path = user_path(id)?;
    ensure_success(client.delete(&path).await?).await?;
    tracing::info!(user_id = id, "user deleted");
    Ok(())
}
