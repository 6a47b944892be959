//! Server lifecycle (component F, §4.F): installs and uninstalls the
//! middleware stack around an externally provided HTTP listener, and wires
//! together the request/view pipeline (D), response coercion (B), error
//! formatting (C) and response writer (E) for each request.
use std::env;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;

use log::{info, warn};

use crate::metrics::{MetricsSink, NullMetricsSink, RequestMetric, TcpMetricsSink};
use crate::middleware::{
    dispatch_pipeline, dispatch_server_install, dispatch_server_uninstall, Middleware, Teardown,
};
use crate::request::RawRequest;
use crate::response::Response;
use crate::router::Router;

pub mod stream;
pub mod tcp;

pub use stream::StreamHttpListener;
pub use tcp::TcpHttpListener;

/// The HTTP listener interface (§6, consumed): "emits listening, close,
/// request(req,res), clientError(exc,sock)". A concrete listener drives a
/// request/client-error callback pair once [`HttpListener::start`] is
/// called, and signals once it has actually stopped accepting via
/// [`HttpListener::wait_stopped`].
pub trait HttpListener: Send + Sync {
    /// Begin accepting connections, dispatching each parsed request to
    /// `on_request` and each malformed one to `on_client_error`. This
    /// crate's listeners are already bound by construction, so `start`
    /// never actually blocks on a "listening" event the way the distilled
    /// spec's async listener does — it returns once the accept loop has
    /// been spawned.
    fn start(
        &self,
        on_request: Arc<dyn Fn(RawRequest) -> Response + Send + Sync>,
        on_client_error: Arc<dyn Fn(&str) + Send + Sync>,
    );
    /// Stop accepting new connections. Idempotent.
    fn stop(&self);
    /// Block until the accept loop spawned by `start` has actually exited.
    fn wait_stopped(&self);
}

/// A condvar-guarded one-shot flag: the blocking realization of an
/// awaitable JS signal (`listening`/`closed`, §3 "Server handle").
/// Signalling twice is harmless.
#[derive(Default)]
struct Signal {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    fn signal(&self) {
        let mut state = self.state.lock().unwrap();
        *state = true;
        self.condvar.notify_all();
    }
    fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while !*state {
            state = self.condvar.wait(state).unwrap();
        }
    }
}

/// Construction options (§4.F). `metrics` and `is_external` fall back to
/// the `METRICS`/`DEBUG` environment variables, read directly via
/// `std::env::var` rather than through a config-file layer.
pub struct ServerOptions {
    pub metrics: Option<Arc<dyn MetricsSink>>,
    pub is_external: bool,
    pub on_client_error: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            metrics: None,
            is_external: true,
            on_client_error: None,
        }
    }
}

fn debug_enabled() -> bool {
    env::var("DEBUG").map(|v| !v.is_empty()).unwrap_or(false)
}

fn default_metrics_sink() -> Arc<dyn MetricsSink> {
    match env::var("METRICS") {
        Ok(url) if !url.is_empty() => Arc::new(TcpMetricsSink::new(&url)),
        _ => Arc::new(NullMetricsSink),
    }
}

/// The opaque handle a server's caller holds (§3 "Server handle"):
/// `wait_listening`/`wait_closed` are the blocking realization of the
/// distilled spec's awaitable `listening`/`closed` futures.
pub struct ServerHandle {
    listener: Arc<dyn HttpListener>,
    listening: Arc<Signal>,
    closed: Arc<Signal>,
    metrics: Arc<dyn MetricsSink>,
    is_external: bool,
    teardown: Arc<Mutex<Option<Vec<Teardown>>>>,
}

fn complete_uninstall(teardown: &Mutex<Option<Vec<Teardown>>>, closed: &Signal) {
    let mut guard = teardown.lock().unwrap();
    if let Some(teardown) = guard.take() {
        drop(guard);
        dispatch_server_uninstall(teardown);
        closed.signal();
    }
}

impl ServerHandle {
    pub fn wait_listening(&self) {
        self.listening.wait();
    }
    pub fn wait_closed(&self) {
        self.closed.wait();
    }
    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }
    pub fn is_external(&self) -> bool {
        self.is_external
    }
    /// Tear down the server: stop the listener, unwind server-install
    /// middleware in reverse declaration order, and resolve `closed`.
    /// Idempotent: a concurrent or repeated call just waits for the
    /// in-flight teardown to finish.
    pub fn uninstall(&self) {
        self.listener.stop();
        complete_uninstall(&self.teardown, &self.closed);
        self.closed.wait();
    }
}

/// Installs `middlewares` around `listener`, routing matched requests
/// through `router` (§4.F "Install sequence").
pub fn serve<C>(
    name: &str,
    listener: impl HttpListener + 'static,
    router: impl Router<C> + 'static,
    middlewares: Vec<Box<dyn Middleware<C>>>,
    options: ServerOptions,
) -> ServerHandle
where
    C: Default + Send + 'static,
{
    let listener: Arc<dyn HttpListener> = Arc::new(listener);
    let router: Arc<dyn Router<C>> = Arc::new(router);
    let middlewares = Arc::new(middlewares);
    let debug = debug_enabled();
    let is_external = options.is_external;
    let metrics = options.metrics.unwrap_or_else(default_metrics_sink);

    let request_metrics = metrics.clone();
    let request_middlewares = middlewares.clone();
    let request_router = router.clone();
    let name_for_log = name.to_string();
    let on_request = Arc::new(move |request: RawRequest| -> Response {
        let start = Instant::now();
        let method = request.method.as_str().to_string();
        let path = request.path.clone();
        let mut context = C::default();
        let response = dispatch_pipeline(
            &request_middlewares,
            request_router.as_ref(),
            request,
            &mut context,
            debug,
            is_external,
        );
        let duration_ms = start.elapsed().as_millis();
        info!(
            "{} {} {} -> {} ({}ms)",
            name_for_log,
            method,
            path,
            response.status_code(),
            duration_ms
        );
        request_metrics.record(&RequestMetric {
            method,
            path,
            status: response.status_code(),
            duration_ms,
        });
        response
    });

    let on_client_error: Arc<dyn Fn(&str) + Send + Sync> = match &options.on_client_error {
        Some(cb) => cb.clone(),
        None => Arc::new(|reason: &str| warn!("malformed client request: {}", reason)),
    };

    // Attach handlers and start accepting (§4.F "attach the request
    // handler ... await the listener's listening event").
    listener.start(on_request, on_client_error);

    // Drive the server-install chain only once accepting has begun.
    let teardown = Arc::new(Mutex::new(Some(dispatch_server_install(&middlewares))));

    let listening = Arc::new(Signal::default());
    listening.signal();
    let closed = Arc::new(Signal::default());

    // A one-shot close handler (§4.F): if the listener stops on its own
    // (or via `ServerHandle::uninstall`), unwind follows without requiring
    // an explicit caller to drive it.
    let watcher_listener = listener.clone();
    let watcher_teardown = teardown.clone();
    let watcher_closed = closed.clone();
    thread::spawn(move || {
        watcher_listener.wait_stopped();
        complete_uninstall(&watcher_teardown, &watcher_closed);
    });

    ServerHandle {
        listener,
        listening,
        closed,
        metrics,
        is_external,
        teardown,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::IntoResponse;
    use crate::router::{ControllerBuilder, PathRouter};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ServerMw {
        id: u32,
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl Middleware<()> for ServerMw {
        fn process_server(&self, teardown: &mut Vec<Teardown>) {
            self.log.lock().unwrap().push(self.id);
            let log = self.log.clone();
            let id = self.id;
            teardown.push(Box::new(move || {
                log.lock().unwrap().push(id);
            }));
        }
    }

    #[test]
    fn test_install_order_and_uninstall_is_lifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = PathRouter::new().with_route(
            "/",
            ControllerBuilder::new()
                .get(|_req, _ctx| Ok(Box::new(()) as Box<dyn IntoResponse + Send>))
                .build(),
        );
        let middlewares: Vec<Box<dyn Middleware<()>>> = vec![
            Box::new(ServerMw { id: 1, log: log.clone() }),
            Box::new(ServerMw { id: 2, log: log.clone() }),
            Box::new(ServerMw { id: 3, log: log.clone() }),
        ];
        let handle = serve::<()>(
            "test",
            StreamHttpListener::new(),
            router,
            middlewares,
            ServerOptions::default(),
        );
        handle.wait_listening();
        handle.uninstall();
        handle.wait_closed();
        assert_eq!(&log.lock().unwrap()[..], &[1, 2, 3, 3, 2, 1]);
    }

    #[test]
    fn test_uninstall_is_idempotent() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        struct CountingMw;
        impl Middleware<()> for CountingMw {
            fn process_server(&self, teardown: &mut Vec<Teardown>) {
                teardown.push(Box::new(|| {
                    CALLS.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }
        let router = PathRouter::<()>::new();
        let handle = serve::<()>(
            "test",
            StreamHttpListener::new(),
            router,
            vec![Box::new(CountingMw)],
            ServerOptions::default(),
        );
        handle.wait_listening();
        handle.uninstall();
        handle.uninstall();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
