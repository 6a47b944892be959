//! Serialises a `Response` onto a socket (component E of the pipeline).
use std::io;
use std::io::prelude::*;

use log::*;

use crate::response::{Body, Response};

/// Returns true if every character of `s` fits in one ISO-8859-1 byte.
fn is_latin1(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xFF)
}

fn header_injection_response() -> Response {
    let body = b"Only ISO-8859-1 strings are valid in headers".to_vec();
    Response::make(Body::Bytes(body), Some(500), vec![])
        .with_header("Content-Type", "text/plain; charset=utf-8")
}

/// Validate that every header name and value is representable in
/// ISO-8859-1, the HTTP/1.1 header encoding; replaces the response with a
/// 500 in place on violation (prevents response splitting via header
/// injection of otherwise-unencodable characters).
fn validate_headers(response: Response) -> Response {
    let bad = response
        .headers()
        .iter()
        .any(|(k, v)| !is_latin1(k) || !is_latin1(v));
    if bad {
        header_injection_response()
    } else {
        response
    }
}

/// Write a Response to `w`. Buffer/string/JSON bodies get a Content-Length
/// header; stream bodies are written without one, relying on the
/// connection being closed at the end of the response (this listener
/// serves one request per connection).
pub fn write_response<W: Write>(w: &mut W, response: Response) -> io::Result<()> {
    let response = validate_headers(response);
    let (status_code, status, headers, body) = response.into_parts();

    write!(w, "HTTP/1.1 {} {}\r\n", status_code, status)?;

    let content_length = match &body {
        Body::Empty => Some(0),
        Body::Bytes(b) => Some(b.len()),
        Body::Text(s) => Some(s.len()),
        Body::Json(b) => Some(b.len()),
        Body::ByteStream(_) | Body::ObjectStream(_) => None,
    };

    for (name, value) in &headers {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        write!(w, "{}: {}\r\n", name, value)?;
    }
    if let Some(len) = content_length {
        write!(w, "Content-Length: {}\r\n", len)?;
    }
    write!(w, "\r\n")?;

    match body {
        Body::Empty => Ok(()),
        Body::Bytes(b) => w.write_all(&b),
        Body::Text(s) => w.write_all(s.as_bytes()),
        Body::Json(b) => w.write_all(&b),
        Body::ByteStream(mut reader) => match io::copy(&mut reader, w) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("client disconnected mid-stream, dropping source");
                Ok(())
            }
            Err(e) => Err(e),
        },
        Body::ObjectStream(items) => write_object_stream(w, items),
    }
}

fn write_object_stream<W: Write>(
    w: &mut W,
    items: Box<dyn Iterator<Item = serde_json::Result<serde_json::Value>> + Send>,
) -> io::Result<()> {
    for item in items {
        match item {
            Ok(value) => {
                serde_json::to_writer(&mut *w, &value)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                w.write_all(b"\n")?;
            }
            Err(err) => {
                write!(w, "{{\"error\":\"{}\"}}\n", err)?;
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn written(response: Response) -> String {
        let mut buf = Vec::new();
        write_response(&mut buf, response).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_write_text_body() {
        let response = Response::make(Body::Text("hi there!".to_string()), None, vec![])
            .with_header("Content-Type", "text/plain; charset=utf-8");
        let out = written(response);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(out.contains("Content-Length: 9\r\n"));
        assert!(out.ends_with("\r\n\r\nhi there!"));
    }

    #[test]
    fn test_write_empty_body_no_content_type() {
        let response = Response::make(Body::Empty, None, vec![]);
        let out = written(response);
        assert!(out.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!out.to_lowercase().contains("content-type"));
    }

    #[test]
    fn test_header_injection_yields_500() {
        let response = Response::make(Body::Empty, None, vec![])
            .with_header("X-Bad", "caf\u{e9}\u{1f600}");
        let out = written(response);
        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(out.contains("Only ISO-8859-1 strings are valid in headers"));
    }

    /// A value whose `Serialize` impl always fails, standing in for a
    /// genuinely unserializable element (unlike a NaN/infinite float, which
    /// `serde_json` quietly maps to `null` rather than erroring).
    struct Failing;

    impl serde::Serialize for Failing {
        fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            Err(serde::ser::Error::custom("deliberately unserializable"))
        }
    }

    #[test]
    fn test_object_stream_stops_on_serialization_error() {
        let items: Vec<serde_json::Result<serde_json::Value>> = vec![
            Ok(serde_json::json!({})),
            Ok(serde_json::json!({})),
            Ok(serde_json::json!({})),
            serde_json::to_value(Failing),
            Ok(serde_json::json!({"shouldNotSee": 1})),
        ];
        let response = Response::make(
            Body::ObjectStream(Box::new(items.into_iter())),
            None,
            vec![],
        )
        .with_header("Content-Type", "application/hats");
        let out = written(response);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Type: application/hats\r\n"));
        let body = out.split("\r\n\r\n").nth(1).unwrap();
        assert!(body.starts_with("{}\n{}\n{}\n{\"error\":"));
        assert!(!body.contains("shouldNotSee"));
    }
}
