//! Client core for the AI Wingman admin dashboard.
//!
//! ARCHITECTURE
//! ============
//! - `storage`: durable key/value persistence for session records.
//! - `session`: the authoritative in-process session and auth-state feed.
//! - `api`: authenticated HTTP client with single-flight token refresh, plus
//!   typed auth and user endpoints.
//! - `guard`: gatekeeping for protected views and sign-in redirection.
//! - `diagnostics`: backend and credential health report.
//! - `config`: environment-driven client configuration.

pub mod api;
pub mod config;
pub mod diagnostics;
pub mod guard;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_helpers;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
