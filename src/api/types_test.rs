use super::*;
use serde_json::json;

// =============================================================================
// unwrap_data
// =============================================================================

#[test]
fn unwrap_data_returns_envelope_contents() {
    assert_eq!(unwrap_data(json!({ "data": { "a": 1 }, "status": "ok" })), json!({ "a": 1 }));
}

#[test]
fn unwrap_data_passes_flat_values_through() {
    assert_eq!(unwrap_data(json!({ "a": 1 })), json!({ "a": 1 }));
    assert_eq!(unwrap_data(json!([1, 2])), json!([1, 2]));
}

#[test]
fn unwrap_data_ignores_null_data() {
    assert_eq!(unwrap_data(json!({ "data": null, "a": 1 })), json!({ "data": null, "a": 1 }));
}

// =============================================================================
// server_message
// =============================================================================

#[test]
fn server_message_prefers_top_level_message() {
    let body = json!({ "message": "Invalid credentials", "data": { "message": "inner" } }).to_string();
    assert_eq!(server_message(&body).as_deref(), Some("Invalid credentials"));
}

#[test]
fn server_message_reads_detail_and_error() {
    assert_eq!(server_message(r#"{"detail":"Token expired"}"#).as_deref(), Some("Token expired"));
    assert_eq!(server_message(r#"{"error":"nope"}"#).as_deref(), Some("nope"));
}

#[test]
fn server_message_looks_inside_data() {
    assert_eq!(server_message(r#"{"data":{"message":"OTP invalid"}}"#).as_deref(), Some("OTP invalid"));
}

#[test]
fn server_message_takes_first_of_list() {
    assert_eq!(server_message(r#"{"message":["first","second"]}"#).as_deref(), Some("first"));
}

#[test]
fn server_message_none_for_html_or_blank() {
    assert_eq!(server_message("<html>502</html>"), None);
    assert_eq!(server_message(r#"{"message":"  "}"#), None);
    assert_eq!(server_message(""), None);
}

// =============================================================================
// ApiError display
// =============================================================================

#[test]
fn status_error_displays_server_text() {
    let err = ApiError::Status { status: 400, message: Some("Email already used".into()) };
    assert_eq!(err.to_string(), "Email already used");
    assert_eq!(err.status(), Some(400));
}

#[test]
fn status_error_falls_back_to_generic_text() {
    let err = ApiError::Status { status: 500, message: None };
    let text = err.to_string();
    assert!(text.contains("500"));
    assert!(text.contains(GENERIC_FAILURE));
}

#[test]
fn validation_error_names_field() {
    assert_eq!(ApiError::Validation("email").to_string(), "email is required");
}

#[test]
fn password_errors_read_as_form_messages() {
    assert_eq!(ApiError::PasswordMismatch.to_string(), "passwords do not match");
    assert_eq!(
        ApiError::PasswordTooShort { min: 6 }.to_string(),
        "password must be at least 6 characters"
    );
}

#[test]
fn requires_sign_in_for_401_and_refresh_failure() {
    assert!(ApiError::Status { status: 401, message: None }.requires_sign_in());
    assert!(ApiError::RefreshFailed("x".into()).requires_sign_in());
    assert!(!ApiError::Status { status: 403, message: None }.requires_sign_in());
    assert!(!ApiError::RefreshTransport("x".into()).requires_sign_in());
}

// =============================================================================
// parse_refresh_token
// =============================================================================

#[test]
fn refresh_token_flat_shape() {
    assert_eq!(parse_refresh_token(r#"{"token":"B"}"#).unwrap(), "B");
    assert_eq!(parse_refresh_token(r#"{"access_token":"C"}"#).unwrap(), "C");
    assert_eq!(parse_refresh_token(r#"{"accessToken":"D"}"#).unwrap(), "D");
}

#[test]
fn refresh_token_enveloped_shape() {
    assert_eq!(parse_refresh_token(r#"{"data":{"token":"B"}}"#).unwrap(), "B");
    assert_eq!(parse_refresh_token(r#"{"data":{"access_token":"C"}}"#).unwrap(), "C");
}

#[test]
fn refresh_token_missing_or_empty_is_error() {
    assert!(parse_refresh_token(r#"{"data":{}}"#).is_err());
    assert!(parse_refresh_token(r#"{"token":""}"#).is_err());
    assert!(parse_refresh_token("oops").is_err());
}

// =============================================================================
// parse_login
// =============================================================================

#[test]
fn login_canonical_envelope() {
    let body = json!({
        "status": "success",
        "data": { "user_id": 17, "email": "admin@wingman.ai", "token": "acc", "refresh_token": "ref" }
    })
    .to_string();
    let payload = parse_login(&body, "typed@wingman.ai").unwrap();
    assert_eq!(payload.user_id, "17");
    assert_eq!(payload.email, "admin@wingman.ai");
    assert_eq!(payload.access_token, "acc");
    assert_eq!(payload.refresh_token, "ref");
}

#[test]
fn login_flat_shape_with_email_fallback() {
    let body = json!({ "user_id": "u1", "token": "acc", "refresh_token": "ref" }).to_string();
    let payload = parse_login(&body, "typed@wingman.ai").unwrap();
    assert_eq!(payload.user_id, "u1");
    assert_eq!(payload.email, "typed@wingman.ai");
}

#[test]
fn login_without_token_is_decode_error() {
    let body = json!({ "data": { "user_id": "u1" } }).to_string();
    assert!(matches!(parse_login(&body, "a@b.com"), Err(ApiError::Decode(_))));
}

#[test]
fn login_without_refresh_token_defaults_empty() {
    let body = json!({ "data": { "user_id": "u1", "token": "acc" } }).to_string();
    assert_eq!(parse_login(&body, "a@b.com").unwrap().refresh_token, "");
}
