//! Tests for the error system.

use sluice::error::*;
use sluice::types::StreamEvent;

#[test]
fn error_api_creation() {
    let err = SluiceError::api(404, "Not found");
    assert!(matches!(&err, SluiceError::Api { status: 404, .. }));
    assert_eq!(err.to_string(), "API error (status 404): Not found");
}

#[test]
fn categories_and_retryability() {
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();
    let cases = vec![
        (SluiceError::api(503, "busy"), ErrorCategory::Server, true),
        (SluiceError::api(401, "who"), ErrorCategory::Authentication, false),
        (SluiceError::api(422, "bad"), ErrorCategory::Api, false),
        (
            SluiceError::RateLimited {
                retry_after_ms: None,
            },
            ErrorCategory::RateLimit,
            true,
        ),
        (
            SluiceError::Transport("reset".into()),
            ErrorCategory::Network,
            true,
        ),
        (
            SluiceError::backend("overloaded_error", "Overloaded"),
            ErrorCategory::Backend,
            false,
        ),
        (
            SluiceError::Serialization(serde_error),
            ErrorCategory::Serialization,
            false,
        ),
        (
            SluiceError::UnsupportedBackend("gemini".into()),
            ErrorCategory::Configuration,
            false,
        ),
    ];

    for (error, category, retryable) in cases {
        assert_eq!(error.category(), category, "{error}");
        assert_eq!(error.is_retryable(), retryable, "{error}");
    }
}

#[test]
fn error_event_serializes_cause_as_text() {
    let event = StreamEvent::error(
        "Overloaded",
        Some(SluiceError::backend("overloaded_error", "Overloaded")),
    );
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["message"], "Overloaded");
    assert_eq!(value["cause"], "Backend error (overloaded_error): Overloaded");
}
