//! Coerces handler and middleware return values into a `Response`.
//!
//! Rust has no runtime type inspection to dispatch on "is this a string, a
//! stream, a plain object?", so each case becomes its own type: a handler
//! returns whichever of `Response`, `()`, `String`, `Vec<u8>`, `Json<T>`,
//! `ByteStream<R>` or `ObjectStream<I, T>` fits, and `into_response` picks
//! the matching rule. This sidesteps the trait-coherence problem a single
//! blanket `impl<T: Serialize> IntoResponse for T` would hit, since it
//! would overlap with the concrete `String`/`Vec<u8>` impls.
use std::io::Read;

use serde::Serialize;

use crate::response::{Body, Response};

/// Anything a handler or middleware may hand back to the pipeline.
/// Dispatched by `self: Box<Self>` so heterogeneous return values can
/// share one `Box<dyn IntoResponse + Send>` slot.
pub trait IntoResponse {
    fn into_response(self: Box<Self>) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self: Box<Self>) -> Response {
        *self
    }
}

/// Rule 2: absent value -> empty body, 204, no content-type header.
impl IntoResponse for () {
    fn into_response(self: Box<Self>) -> Response {
        Response::make(Body::Empty, None, vec![])
    }
}

/// Rules 2/3: empty string -> 204 empty body; non-empty -> text/plain.
impl IntoResponse for String {
    fn into_response(self: Box<Self>) -> Response {
        string_into_response(*self)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self: Box<Self>) -> Response {
        string_into_response(self.to_string())
    }
}

fn string_into_response(s: String) -> Response {
    if s.is_empty() {
        Response::make(Body::Empty, None, vec![])
    } else {
        Response::make(Body::Text(s), None, vec![])
            .with_default_content_type("text/plain; charset=utf-8")
    }
}

/// Rule 4: raw bytes -> application/octet-stream unless preset.
impl IntoResponse for Vec<u8> {
    fn into_response(self: Box<Self>) -> Response {
        Response::make(Body::Bytes(*self), None, vec![])
            .with_default_content_type("application/octet-stream")
    }
}

/// Rule 7: a plain serializable value, wrapped so it cannot be confused with
/// the String/Vec<u8> cases above. On serialization failure (the only
/// realizable top-level analogue of a non-serializable value) the response
/// degrades to a one-line JSON error body rather than panicking.
pub struct Json<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self: Box<Self>) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::make(Body::Json(bytes), None, vec![])
                .with_default_content_type("application/json; charset=utf-8"),
            Err(err) => {
                let body = format!("{{\"error\":\"{}\"}}", err).into_bytes();
                Response::make(Body::Json(body), Some(500), vec![])
                    .with_default_content_type("application/json; charset=utf-8")
            }
        }
    }
}

/// Rule 6: a byte stream, copied through unchanged by the writer.
pub struct ByteStream<R: Read + Send + 'static>(pub R);

impl<R: Read + Send + 'static> IntoResponse for ByteStream<R> {
    fn into_response(self: Box<Self>) -> Response {
        Response::make(Body::ByteStream(Box::new(self.0)), None, vec![])
            .with_default_content_type("application/octet-stream")
    }
}

/// Rule 5: an object stream, each element serialised as one NDJSON line.
pub struct ObjectStream<I, T>(pub I)
where
    I: Iterator<Item = T> + Send + 'static,
    T: Serialize;

impl<I, T> IntoResponse for ObjectStream<I, T>
where
    I: Iterator<Item = T> + Send + 'static,
    T: Serialize,
{
    fn into_response(self: Box<Self>) -> Response {
        let items = self.0.map(|item| serde_json::to_value(&item));
        Response::make(Body::ObjectStream(Box::new(items)), None, vec![])
            .with_default_content_type("application/x-ndjson; charset=utf-8")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn coerce<T: IntoResponse + 'static>(v: T) -> Response {
        Box::new(v).into_response()
    }

    #[test]
    fn test_empty_string_is_204() {
        let r = coerce("".to_string());
        assert_eq!(r.status_code(), 204);
        assert!(r.body().is_empty());
        assert!(!r.has_header("content-type"));
    }

    #[test]
    fn test_nonempty_string_is_text_plain() {
        let r = coerce("hi there!".to_string());
        assert_eq!(r.status_code(), 200);
        assert_eq!(r.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_bytes_default_octet_stream() {
        let r = coerce(b"abc".to_vec());
        assert_eq!(r.header("content-type"), Some("application/octet-stream"));
    }

    #[test]
    fn test_json_default_content_type() {
        let r = coerce(Json(json!({"test": "anything!"})));
        assert_eq!(r.status_code(), 200);
        assert_eq!(
            r.header("content-type"),
            Some("application/json; charset=utf-8")
        );
        match r.body() {
            Body::Json(bytes) => assert_eq!(bytes, b"{\"test\":\"anything!\"}"),
            _ => panic!("expected Json body"),
        }
    }

    #[test]
    fn test_unit_is_empty_204() {
        let r = coerce(());
        assert_eq!(r.status_code(), 204);
    }
}
