use std::sync::{Mutex, MutexGuard};

use super::*;

/// Serializes tests that mutate `WINGMAN_*` vars.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// # Safety
/// Caller must hold `env_lock()`.
unsafe fn clear_wingman_env() {
    unsafe {
        std::env::remove_var("WINGMAN_ENV");
        std::env::remove_var("WINGMAN_API_BASE_URL");
        std::env::remove_var("WINGMAN_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("WINGMAN_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("WINGMAN_STATE_DIR");
    }
}

// =============================================================================
// from_env
// =============================================================================

#[test]
fn from_env_defaults_to_development() {
    let _guard = env_lock();
    unsafe { clear_wingman_env() };

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.environment, Environment::Development);
    assert_eq!(cfg.base_url, DEFAULT_DEVELOPMENT_BASE_URL);
    assert_eq!(cfg.timeouts, Timeouts::default());
    assert_eq!(cfg.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
}

#[test]
fn from_env_parses_overrides() {
    let _guard = env_lock();
    unsafe {
        clear_wingman_env();
        std::env::set_var("WINGMAN_ENV", "production");
        std::env::set_var("WINGMAN_API_BASE_URL", "https://api.example.test/");
        std::env::set_var("WINGMAN_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("WINGMAN_CONNECT_TIMEOUT_SECS", "7");
        std::env::set_var("WINGMAN_STATE_DIR", "/tmp/wingman-state");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.environment, Environment::Production);
    assert_eq!(cfg.base_url, "https://api.example.test");
    assert_eq!(cfg.timeouts, Timeouts { request_secs: 42, connect_secs: 7 });
    assert_eq!(cfg.state_dir, PathBuf::from("/tmp/wingman-state"));

    unsafe { clear_wingman_env() };
}

#[test]
fn from_env_production_default_base_url() {
    let _guard = env_lock();
    unsafe {
        clear_wingman_env();
        std::env::set_var("WINGMAN_ENV", "prod");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.base_url, DEFAULT_PRODUCTION_BASE_URL);

    unsafe { clear_wingman_env() };
}

#[test]
fn from_env_bad_timeout_falls_back() {
    let _guard = env_lock();
    unsafe {
        clear_wingman_env();
        std::env::set_var("WINGMAN_REQUEST_TIMEOUT_SECS", "soon");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);

    unsafe { clear_wingman_env() };
}

#[test]
fn from_env_zero_timeout_falls_back() {
    let _guard = env_lock();
    unsafe {
        clear_wingman_env();
        std::env::set_var("WINGMAN_REQUEST_TIMEOUT_SECS", "0");
        std::env::set_var("WINGMAN_CONNECT_TIMEOUT_SECS", "0");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.timeouts, Timeouts::default());

    unsafe { clear_wingman_env() };
}

// =============================================================================
// parse helpers
// =============================================================================

#[test]
fn parse_environment_variants() {
    assert_eq!(parse_environment(None).unwrap(), Environment::Development);
    assert_eq!(parse_environment(Some("DEV")).unwrap(), Environment::Development);
    assert_eq!(parse_environment(Some("Production")).unwrap(), Environment::Production);
}

#[test]
fn parse_environment_unknown_errors() {
    let err = parse_environment(Some("staging")).unwrap_err().to_string();
    assert!(err.contains("unknown WINGMAN_ENV"));
}

#[test]
fn normalize_base_url_trims_slashes_and_whitespace() {
    assert_eq!(normalize_base_url(" http://x/ "), "http://x");
    assert_eq!(normalize_base_url("http://x//"), "http://x");
    assert_eq!(normalize_base_url("http://x"), "http://x");
}

#[test]
fn with_base_url_uses_default_timeouts() {
    let cfg = ClientConfig::with_base_url("http://x/");
    assert_eq!(cfg.base_url, "http://x");
    assert_eq!(cfg.timeouts.request(), Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
    assert_eq!(cfg.timeouts.connect(), Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
}

#[test]
fn set_base_url_normalizes_and_rejects_empty() {
    let mut cfg = ClientConfig::with_base_url("http://x");
    cfg.set_base_url("https://api.example.com/ ").unwrap();
    assert_eq!(cfg.base_url, "https://api.example.com");
    assert!(cfg.set_base_url(" / ").is_err());
    assert_eq!(cfg.base_url, "https://api.example.com");
}
