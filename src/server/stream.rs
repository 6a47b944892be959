//! Single-stream HTTP serving, for tests and doc examples that would
//! otherwise need a live socket.
use std::io::prelude::*;
use std::sync::Arc;

use crate::request::parser::RequestParser;
use crate::request::RawRequest;
use crate::response::writer::write_response;
use crate::response::{Body, Response};
use crate::server::{HttpListener, Signal};

/// Parse one request off `stream` and write back whatever `on_request`
/// returns, the same request/response shape [`super::TcpHttpListener`]
/// drives per-connection, minus the network accept loop around it.
///
/// ```
/// use midware::request::RawRequest;
/// use midware::response::{Body, Response};
/// use midware::server::stream::serve_once;
///
/// let read_buf = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let mut write_buf = vec![];
/// let mut stream = midware::io::ReadWriteAdapter::new(&read_buf[..], &mut write_buf);
/// serve_once(&mut stream, &|_req: RawRequest| {
///     Response::make(Body::Text("Hello!".to_string()), None, vec![])
/// });
///
/// assert!(std::str::from_utf8(&write_buf[..]).unwrap().ends_with("Hello!"));
/// ```
pub fn serve_once<S: Read + Write>(stream: &mut S, on_request: &dyn Fn(RawRequest) -> Response) {
    let response = {
        let mut parser = RequestParser::new(&mut *stream);
        match parser.parse() {
            Ok(request) => on_request(request),
            Err(e) => Response::make(Body::Text(e.to_string()), Some(400), vec![])
                .with_header("Content-Type", "text/plain; charset=utf-8"),
        }
    };
    let _ = write_response(stream, response);
}

/// A no-op [`HttpListener`] that never calls back into the pipeline: it
/// exists so server-lifecycle tests and examples can exercise
/// install/`ServerHandle::uninstall` without a live socket. Real request
/// serving for a single stream goes through [`serve_once`] directly.
pub struct StreamHttpListener {
    stopped: Arc<Signal>,
}

impl StreamHttpListener {
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(Signal::default()),
        }
    }
}

impl Default for StreamHttpListener {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpListener for StreamHttpListener {
    fn start(
        &self,
        _on_request: Arc<dyn Fn(RawRequest) -> Response + Send + Sync>,
        _on_client_error: Arc<dyn Fn(&str) + Send + Sync>,
    ) {
    }

    fn stop(&self) {
        self.stopped.signal();
    }

    fn wait_stopped(&self) {
        self.stopped.wait();
    }
}
