//! Route guard and sign-in redirection.
//!
//! SYSTEM CONTEXT
//! ==============
//! Protected views (dashboard pages, CLI subcommands that need a session)
//! are entered through `RouteGuard`. The API client holds a `Navigator` so a
//! fatal refresh failure can send the user back to sign-in from anywhere.

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;

use crate::session::SessionStore;

/// Where unauthenticated callers are sent.
pub const SIGN_IN_PATH: &str = "/login";
/// Landing view after sign-in when no original location was recorded.
pub const DEFAULT_HOME_PATH: &str = "/dashboard";

// =============================================================================
// NAVIGATOR
// =============================================================================

/// Capability to send the application to the sign-in entry point.
pub trait Navigator: Send + Sync {
    /// `from` is the location the user was on, if known.
    fn redirect_to_sign_in(&self, from: Option<&str>);
}

/// Navigator for headless runs: records the redirect in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect_to_sign_in(&self, from: Option<&str>) {
        tracing::warn!(to = SIGN_IN_PATH, from = from.unwrap_or("-"), "redirecting to sign-in");
    }
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Redirect { to: String, from: String },
}

/// What a protected view can do once the guard has decided.
pub trait GuardTarget {
    type Output;

    fn render(&mut self) -> Self::Output;

    /// `from` is the originally requested location, to return to after sign-in.
    fn redirect_to_sign_in(&mut self, from: &str) -> Self::Output;
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: SessionStore,
}

impl RouteGuard {
    #[must_use]
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    /// Evaluate once per navigation. Trusts local state only.
    #[must_use]
    pub fn decide(&self, location: &str) -> GuardDecision {
        if self.session.is_authenticated() {
            GuardDecision::Render
        } else {
            tracing::debug!(location, "unauthenticated access to protected view");
            GuardDecision::Redirect { to: SIGN_IN_PATH.to_owned(), from: location.to_owned() }
        }
    }

    pub fn enter<T: GuardTarget>(&self, location: &str, target: &mut T) -> T::Output {
        match self.decide(location) {
            GuardDecision::Render => target.render(),
            GuardDecision::Redirect { from, .. } => target.redirect_to_sign_in(&from),
        }
    }
}

/// Where to go after a successful sign-in.
#[must_use]
pub fn return_location(from: Option<&str>) -> &str {
    match from {
        Some(path) if path.starts_with('/') && path != SIGN_IN_PATH => path,
        _ => DEFAULT_HOME_PATH,
    }
}
