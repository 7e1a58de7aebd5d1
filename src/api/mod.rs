//! REST API access for the admin dashboard.
//!
//! ARCHITECTURE
//! ============
//! `client` owns transport concerns: base URL, bearer token, refresh and
//! retry. Endpoint modules (`auth`, `users`) are thin typed wrappers over it
//! and own request validation and response-envelope handling.

pub mod auth;
pub mod client;
pub mod types;
pub mod users;

pub use client::{ApiClient, RequestOptions};
pub use types::ApiError;
