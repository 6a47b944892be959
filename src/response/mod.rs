//! HTTP response representation and the handler-return-value coercer.
use std::io::Read;

pub mod coerce;
pub mod status;
pub mod writer;

pub use coerce::{ByteStream, IntoResponse, Json, ObjectStream};

/// Body content, tagged by kind rather than inspected at runtime.
///
/// `Json` carries an already-serialized buffer: serialization happens
/// once, at coercion time, before the body ever reaches the writer.
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    Json(Vec<u8>),
    ByteStream(Box<dyn Read + Send>),
    /// Each element pre-serialized to a `serde_json::Value`; a `Result::Err`
    /// records a per-element serialization failure (e.g. a `Serialize` impl
    /// that itself returns `Err`) so the writer can emit the standardised
    /// `{"error":"..."}` line and stop.
    ObjectStream(Box<dyn Iterator<Item = serde_json::Result<serde_json::Value>> + Send>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(s) => s.is_empty(),
            Body::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }
}

/// An HTTP response: status, case-insensitive headers, and a tagged body.
///
/// Once built, a `Response` is conceptually immutable for the rest of the
/// pipeline: `with_header` consumes `self` and returns a new value rather
/// than mutating in place.
pub struct Response {
    status_code: u16,
    status: String,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    /// Construct a Response directly from a body and optional status/headers.
    /// Status defaults to 204 for an empty body, 200 otherwise.
    pub fn make(body: Body, status_code: Option<u16>, headers: Vec<(String, String)>) -> Self {
        let status_code = status_code.unwrap_or_else(|| if body.is_empty() { 204 } else { 200 });
        Self {
            status: status::default(status_code),
            status_code,
            headers,
            body,
        }
    }
    pub fn empty() -> Self {
        Self::make(Body::Empty, None, vec![])
    }
    pub fn status_code(&self) -> u16 {
        self.status_code
    }
    pub fn status(&self) -> &str {
        &self.status
    }
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
    pub fn body(&self) -> &Body {
        &self.body
    }
    pub fn into_parts(self) -> (u16, String, Vec<(String, String)>, Body) {
        (self.status_code, self.status, self.headers, self.body)
    }
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }
    /// Change the status code, updating the default reason phrase.
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self.status = status::default(status_code);
        self
    }
    /// Non-mutating header addition: returns a new Response.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
    /// Set the content-type header only if one is not already present,
    /// matching the coercer's "unless caller preset a content-type" rule.
    pub fn with_default_content_type(self, content_type: &str) -> Self {
        if self.has_header("content-type") {
            self
        } else {
            self.with_header("Content-Type", content_type)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_make_empty_defaults_204() {
        let r = Response::make(Body::Empty, None, vec![]);
        assert_eq!(r.status_code(), 204);
        assert_eq!(r.status(), "No Content");
    }

    #[test]
    fn test_make_text_defaults_200() {
        let r = Response::make(Body::Text("hi".to_string()), None, vec![]);
        assert_eq!(r.status_code(), 200);
    }

    #[test]
    fn test_with_header_replaces_case_insensitively() {
        let r = Response::empty()
            .with_header("Content-Type", "text/plain")
            .with_header("content-type", "application/json");
        assert_eq!(r.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(r.headers().len(), 1);
    }

    #[test]
    fn test_with_default_content_type_preserves_preset() {
        let r = Response::empty()
            .with_header("Content-Type", "application/hats")
            .with_default_content_type("application/x-ndjson; charset=utf-8");
        assert_eq!(r.header("content-type"), Some("application/hats"));
    }
}
