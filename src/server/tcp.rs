//! TCP HTTP listener (§6 "HTTP listener interface", concrete realization).
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::*;

use crate::request::parser::RequestParser;
use crate::request::RawRequest;
use crate::response::writer::write_response;
use crate::response::{Body, Response};
use crate::runner::Runner;
use crate::server::{HttpListener, Signal};

/// How long the accept loop sleeps between non-blocking `accept()` polls
/// while waiting for either a connection or a stop request.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A single- or multi-threaded, non-blocking-poll TCP listener, the
/// concrete `HttpListener` this crate ships. Polling (rather than a
/// blocking `accept()`) lets the loop be told to stop from another
/// thread, as `ServerHandle::uninstall` requires.
pub struct TcpHttpListener {
    listener: TcpListener,
    n_threads: usize,
    timeout: Option<Duration>,
    stopping: Arc<AtomicBool>,
    stopped: Arc<Signal>,
}

impl TcpHttpListener {
    /// Bind `bind_addr` ("0.0.0.0:8080"-style).
    ///
    /// # Arguments
    /// * `n_threads`: 0 spawns a thread per connection, 1 serves
    ///   connections one at a time on the accept-loop thread, 2+ uses a
    ///   fixed-size thread pool (`Runner::new`).
    /// * `timeout`: per-connection read/write socket timeout.
    pub fn bind(bind_addr: &str, n_threads: usize, timeout: Option<Duration>) -> io::Result<Self> {
        let listener = TcpListener::bind(bind_addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            n_threads,
            timeout,
            stopping: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(Signal::default()),
        })
    }
}

impl HttpListener for TcpHttpListener {
    fn start(
        &self,
        on_request: Arc<dyn Fn(RawRequest) -> Response + Send + Sync>,
        on_client_error: Arc<dyn Fn(&str) + Send + Sync>,
    ) {
        let listener = self
            .listener
            .try_clone()
            .expect("failed to clone listener socket");
        let n_threads = self.n_threads;
        let timeout = self.timeout;
        let stopping = self.stopping.clone();
        let stopped = self.stopped.clone();

        thread::spawn(move || {
            {
                let mut runner = Runner::new(n_threads);
                loop {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    match listener.accept() {
                        Ok((stream, addr)) => {
                            if let Err(e) = stream.set_nonblocking(false) {
                                error!("failed to set connection blocking: {}", e);
                                continue;
                            }
                            let _ = stream.set_read_timeout(timeout);
                            let _ = stream.set_write_timeout(timeout);
                            let on_request = on_request.clone();
                            let on_client_error = on_client_error.clone();
                            runner.run(move || {
                                handle_connection(stream, addr, &on_request, &on_client_error);
                            });
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            thread::sleep(POLL_INTERVAL);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                // `runner` drops here, blocking until in-flight connections
                // finish, before `stopped` resolves.
            }
            stopped.signal();
        });
    }

    fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    fn wait_stopped(&self) {
        self.stopped.wait();
    }
}

fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    on_request: &Arc<dyn Fn(RawRequest) -> Response + Send + Sync>,
    on_client_error: &Arc<dyn Fn(&str) + Send + Sync>,
) {
    debug!("accepted connection from {:?}", addr);
    let start = Instant::now();
    let mut parser = RequestParser::new(&mut stream);
    let response = match parser.parse() {
        Ok(request) => {
            trace!("REQUEST {:?}", &request);
            on_request(request)
        }
        Err(e) => {
            on_client_error(&e.to_string());
            Response::make(Body::Text(e.to_string()), Some(400), vec![])
                .with_header("Content-Type", "text/plain; charset=utf-8")
        }
    };
    let response = response.with_header("Connection", "close");
    trace!("wrote response in {}ms", start.elapsed().as_millis());
    if let Err(e) = write_response(&mut stream, response) {
        error!("{:?}: IO error writing response: {}", addr, e);
    }
}
