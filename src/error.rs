//! The crate-level error type (component C, §4.C/§7).
//!
//! A handler or middleware signals failure by returning `Err(PipelineError)`
//! instead of throwing: Rust has no exceptions, so "caught failure" becomes
//! "propagated `Err`", and "non-Error throw" becomes a caught panic (see
//! [`crate::middleware`]). `HeaderInjection` (§7) is not represented here —
//! it is raised directly by the response writer (§4.E), the one place that
//! actually knows whether a header is valid, rather than threaded back
//! through the pipeline as an error.
use std::backtrace::Backtrace;
use std::fmt;

use crate::response::{Body, Response};

/// A handler-raised error carrying an HTTP status and message, the Rust
/// analogue of "a status attached to the error via the response mechanism"
/// (§4.C). The backtrace is captured at construction time, the earliest
/// point at which one is actually meaningful.
pub struct HandlerError {
    status: u16,
    message: String,
    backtrace: Backtrace,
}

impl HandlerError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("status", &self.status)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

/// The engine's error taxonomy (§7), minus `HeaderInjection` (handled by the
/// writer, §4.E) and `BadMiddlewareValue`. The latter's trigger — a
/// middleware resolving to "undefined" — has no realizable analogue once
/// `process_request` is required to return a `RequestResult`; see
/// DESIGN.md's Open Questions.
#[derive(Debug)]
pub enum PipelineError {
    /// Router yielded no match.
    NotFound { method: String, path: String },
    /// Match exists but the controller has no handler under that name.
    NotImplemented { method: String, path: String },
    /// A handler or middleware panicked with a non-`Error` payload; the
    /// realizable analogue of a JS `throw` of a non-`Error` value.
    NonErrorThrow { value: String },
    /// An ordinary handler/middleware failure, carrying its own status.
    Handler(HandlerError),
}

impl PipelineError {
    pub fn handler(status: u16, message: impl Into<String>) -> Self {
        Self::Handler(HandlerError::new(status, message))
    }

    pub fn not_found(method: &str, path: &str) -> Self {
        Self::NotFound {
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    pub fn not_implemented(method: &str, path: &str) -> Self {
        Self::NotImplemented {
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    pub(crate) fn non_error_throw(value: String) -> Self {
        Self::NonErrorThrow {
            value: format!(
                "Expected error to be instanceof Error, got \"{}\" instead",
                value
            ),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::NotImplemented { .. } => 501,
            Self::NonErrorThrow { .. } => 500,
            Self::Handler(e) => e.status,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NotFound { .. } => "Not Found".to_string(),
            Self::NotImplemented { method, path } => {
                format!("\"{} {}\" is not implemented.", method, path)
            }
            Self::NonErrorThrow { value } => value.clone(),
            Self::Handler(e) => e.message.clone(),
        }
    }

    fn backtrace(&self) -> Option<String> {
        match self {
            Self::Handler(e) => Some(format!("{}", e.backtrace)),
            _ => None,
        }
    }

    /// Convert into a JSON error Response. `debug` mirrors the `DEBUG`
    /// environment variable; `is_external` mirrors `ServerOptions::is_external`.
    /// A `stack` field is included only when both are set, matching §4.C.
    pub fn into_response(self, debug: bool, is_external: bool) -> Response {
        let status = self.status();
        let mut fields = serde_json::Map::new();
        fields.insert(
            "message".to_string(),
            serde_json::Value::String(self.message()),
        );
        if debug && !is_external {
            if let Some(stack) = self.backtrace() {
                fields.insert("stack".to_string(), serde_json::Value::String(stack));
            }
        }
        let body = serde_json::to_vec(&serde_json::Value::Object(fields))
            .expect("a Map<String, Value> of strings always serializes");
        Response::make(Body::Json(body), Some(status), vec![])
            .with_header("Content-Type", "application/json; charset=utf-8")
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for PipelineError {}

impl From<HandlerError> for PipelineError {
    fn from(e: HandlerError) -> Self {
        Self::Handler(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_not_found_body() {
        let err = PipelineError::not_found("GET", "/nope");
        assert_eq!(err.status(), 404);
        assert_eq!(err.message(), "Not Found");
    }

    #[test]
    fn test_not_implemented_body() {
        let err = PipelineError::not_implemented("GET", "/");
        assert_eq!(err.status(), 501);
        assert_eq!(err.message(), "\"GET /\" is not implemented.");
    }

    #[test]
    fn test_handler_error_no_stack_when_external() {
        let err = PipelineError::handler(500, "It fails!");
        let response = err.into_response(true, true);
        assert_eq!(response.status_code(), 500);
        match response.body() {
            Body::Json(bytes) => {
                let v: serde_json::Value = serde_json::from_slice(bytes).unwrap();
                assert_eq!(v["message"], "It fails!");
                assert!(v.get("stack").is_none());
            }
            _ => panic!("expected Json body"),
        }
    }

    #[test]
    fn test_handler_error_stack_when_internal_and_debug() {
        let err = PipelineError::handler(500, "boom");
        let response = err.into_response(true, false);
        match response.body() {
            Body::Json(bytes) => {
                let v: serde_json::Value = serde_json::from_slice(bytes).unwrap();
                assert!(v.get("stack").is_some());
            }
            _ => panic!("expected Json body"),
        }
    }

    #[test]
    fn test_non_error_throw_message() {
        let err = PipelineError::non_error_throw("oops".to_string());
        assert_eq!(
            err.message(),
            "Expected error to be instanceof Error, got \"oops\" instead"
        );
    }
}
