//! Maps lifecycle errors to the labels used in feature files.
//!
//! Included by the behaviour suites via:
//!
//! ```rust
//! #[path = "common/error_kinds.rs"]
//! mod error_kinds;
//! ```

use hangar::LifecycleError;
use hangar::test_support::ScriptedError;

/// Snake case label for the error variant.
pub const fn error_kind(err: &LifecycleError<ScriptedError>) -> &'static str {
    match err {
        LifecycleError::InvalidRequest(_) => "invalid_request",
        LifecycleError::InvalidPolicy(_) => "invalid_policy",
        LifecycleError::CreateFailed { .. } => "create_failed",
        LifecycleError::ReadinessTimeout { .. } => "readiness_timeout",
        LifecycleError::DrainTimeout { .. } => "drain_timeout",
        LifecycleError::DeleteFailed { .. } => "delete_failed",
        LifecycleError::InconsistentState { .. } => "inconsistent_state",
        LifecycleError::Query { .. } => "query",
        LifecycleError::Cancelled { .. } => "cancelled",
        LifecycleError::ImageTimeout { .. } => "image_timeout",
    }
}
