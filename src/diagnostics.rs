//! Backend health check.
//!
//! DESIGN
//! ======
//! Diagnostic requests go straight through the HTTP client, never through
//! [`ApiClient::request`]: a diagnostic run must not trigger a token refresh
//! or clear the session. Each step appends one or more [`Check`]s; the
//! report tallies them.

#[cfg(test)]
#[path = "diagnostics_test.rs"]
mod tests;

use std::fmt;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use serde_json::{Value, json};

use crate::api::ApiClient;
use crate::api::auth::{LOGIN_PATH, PROFILE_PATH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Warn,
    Fail,
    Info,
}

impl Outcome {
    fn marker(self) -> &'static str {
        match self {
            Self::Pass => "[ok]  ",
            Self::Warn => "[warn]",
            Self::Fail => "[fail]",
            Self::Info => "[info]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub outcome: Outcome,
    pub label: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub checks: Vec<Check>,
}

impl DiagnosticReport {
    fn push(&mut self, outcome: Outcome, label: &str, detail: Option<String>) {
        self.checks.push(Check { outcome, label: label.to_owned(), detail });
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.checks.iter().filter(|c| c.outcome == outcome).count()
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(Outcome::Pass)
    }

    #[must_use]
    pub fn warnings(&self) -> usize {
        self.count(Outcome::Warn)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(Outcome::Fail)
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.failed() == 0
    }

    #[must_use]
    pub fn find(&self, label: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.label == label)
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            match &check.detail {
                Some(detail) => writeln!(f, "{} {}: {detail}", check.outcome.marker(), check.label)?,
                None => writeln!(f, "{} {}", check.outcome.marker(), check.label)?,
            }
        }
        writeln!(f)?;
        write!(
            f,
            "passed {}, warnings {}, failed {}",
            self.passed(),
            self.warnings(),
            self.failed()
        )
    }
}

// =============================================================================
// STEPS
// =============================================================================

/// Run every diagnostic step against the client's backend.
pub async fn run(client: &ApiClient) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();
    check_base_url(client, &mut report);
    let access_token = check_credentials(client, &mut report);
    check_login_endpoint(client, &mut report).await;
    match access_token {
        Some(token) => check_profile_endpoint(client, &token, &mut report).await,
        None => report.push(Outcome::Warn, "profile endpoint", Some("skipped, sign in first".into())),
    }
    tracing::info!(
        passed = report.passed(),
        warnings = report.warnings(),
        failed = report.failed(),
        "diagnostics complete"
    );
    report
}

fn check_base_url(client: &ApiClient, report: &mut DiagnosticReport) {
    let base_url = client.base_url();
    report.push(Outcome::Info, "api base url", Some(base_url.to_owned()));
    match reqwest::Url::parse(base_url) {
        Ok(_) => report.push(Outcome::Pass, "api base url is valid", None),
        Err(e) => report.push(Outcome::Fail, "api base url is invalid", Some(e.to_string())),
    }
}

/// Returns the stored access token when there is one.
fn check_credentials(client: &ApiClient, report: &mut DiagnosticReport) -> Option<String> {
    let session = client.session();
    let access_token = session.access_token();
    if access_token.is_some() {
        report.push(Outcome::Pass, "access token stored", None);
    } else {
        report.push(Outcome::Warn, "access token stored", Some("none, sign in required".into()));
    }

    if session.refresh_token().is_some() {
        report.push(Outcome::Pass, "refresh token stored", None);
    } else {
        report.push(Outcome::Warn, "refresh token stored", Some("missing".into()));
    }

    match session.session() {
        Some(user) => report.push(Outcome::Pass, "user id stored", Some(user.user_id)),
        None => report.push(Outcome::Warn, "user id stored", Some("missing".into())),
    }
    access_token
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

async fn check_login_endpoint(client: &ApiClient, report: &mut DiagnosticReport) {
    let sent = client
        .http()
        .post(client.url(LOGIN_PATH))
        .json(&json!({ "email": "test", "password": "test" }))
        .send()
        .await;
    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            report.push(Outcome::Fail, "login endpoint reachable", Some(e.to_string()));
            return;
        }
    };
    report.push(
        Outcome::Pass,
        "login endpoint reachable",
        Some(format!("status {}", response.status().as_u16())),
    );
    if is_json(response.headers()) {
        report.push(Outcome::Pass, "login endpoint returns json", None);
    } else {
        report.push(Outcome::Fail, "login endpoint returns json", None);
    }
}

async fn check_profile_endpoint(client: &ApiClient, access_token: &str, report: &mut DiagnosticReport) {
    let sent = client
        .http()
        .get(client.url(PROFILE_PATH))
        .header(AUTHORIZATION, format!("Bearer {access_token}"))
        .send()
        .await;
    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            report.push(Outcome::Fail, "profile endpoint", Some(e.to_string()));
            return;
        }
    };

    let label = "profile endpoint";
    match response.status() {
        StatusCode::OK => {
            report.push(Outcome::Pass, label, Some("200 OK".into()));
            if !is_json(response.headers()) {
                report.push(Outcome::Fail, "profile returns json", None);
                return;
            }
            match response.json::<Value>().await {
                Ok(body) if body.get("data").is_some() || body.get("user").is_some() => {
                    report.push(Outcome::Pass, "profile payload shape", None);
                }
                Ok(_) => report.push(Outcome::Warn, "profile payload shape", Some("unexpected structure".into())),
                Err(e) => report.push(Outcome::Fail, "profile payload shape", Some(e.to_string())),
            }
        }
        StatusCode::UNAUTHORIZED => {
            report.push(Outcome::Fail, label, Some("401 unauthorized, token may be expired".into()));
        }
        StatusCode::NOT_FOUND => {
            report.push(Outcome::Fail, label, Some("404 not found, endpoint may not exist".into()));
        }
        other => report.push(Outcome::Warn, label, Some(format!("unexpected status {}", other.as_u16()))),
    }
}
