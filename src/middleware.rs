//! The three-phase middleware pipeline (component D, §4.D).
//!
//! A middleware is a trait object exposing any subset of three phase
//! hooks; a missing hook's default implementation just calls `next`, so it
//! is "transparently skipped" for that phase exactly as §3 specifies.
//! Request and view phases are implemented as an explicit index-advancing
//! dispatcher (spec.md §9's design note) rather than a closure fold — a
//! recursive closure borrowing the middleware slice fights the borrow
//! checker for no benefit here.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::trace;

use crate::error::PipelineError;
use crate::request::RawRequest;
use crate::response::{IntoResponse, Response};
use crate::router::{Controller, Router};

/// A handler or middleware's return value, boxed so heterogeneous
/// `IntoResponse` implementors (`String`, `Json<T>`, `ByteStream<R>`, ...)
/// can share one slot.
pub type PipelineResult = Result<Box<dyn IntoResponse + Send>, PipelineError>;

/// Closure run by the server-install phase as it unwinds, in reverse
/// installation order (§4.D "Server-install phase").
pub type Teardown = Box<dyn FnOnce() + Send>;

type RequestNext<'a, C> = dyn FnMut(RawRequest, &mut C) -> PipelineResult + 'a;
type ViewNext<'a, C> = dyn FnMut(&RawRequest, &Controller<C>, &str, &mut C) -> PipelineResult + 'a;

/// A polymorphic middleware record (§3): any subset of the three phase
/// hooks. Default implementations skip straight to `next`.
pub trait Middleware<C>: Send + Sync {
    /// Server-install phase. Called once, in declared order, when the
    /// server starts listening. A middleware with teardown work to do
    /// pushes a closure onto `teardown`; see [`Teardown`].
    fn process_server(&self, teardown: &mut Vec<Teardown>) {
        let _ = teardown;
    }

    /// Request phase. Called once per request, in declared order.
    fn process_request(
        &self,
        request: RawRequest,
        context: &mut C,
        next: &mut RequestNext<'_, C>,
    ) -> PipelineResult {
        next(request, context)
    }

    /// View phase. Called once per request that reached a route match, in
    /// declared order, innermost `next` being the handler itself.
    fn process_view(
        &self,
        request: &RawRequest,
        controller: &Controller<C>,
        name: &str,
        context: &mut C,
        next: &mut ViewNext<'_, C>,
    ) -> PipelineResult {
        next(request, controller, name, context)
    }
}

/// Run `f`, converting a panic with a non-[`std::error::Error`] payload
/// into the synthetic [`PipelineError::NonErrorThrow`] (§4.C, §7 row
/// `NonErrorThrow`) instead of unwinding past the pipeline. This is the
/// realizable Rust analogue of "throw of a non-error value": Rust has no
/// runtime type to catch besides `Any`, so the payload's message is
/// recovered on a best-effort basis via `downcast_ref`.
fn catch_panic<F>(f: F) -> PipelineResult
where
    F: FnOnce() -> PipelineResult,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PipelineError::non_error_throw(describe_panic(payload))),
    }
}

fn describe_panic(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Coerce a successful hop's result to a concrete `Response` before handing
/// it back to the enclosing middleware, so "downstream middleware always
/// observes a Response" (§4.D, §9 Open Questions) regardless of what raw
/// value an inner handler/middleware actually returned. Errors pass through
/// unconverted: they are formatted into a response exactly once, at the
/// outer boundary of the whole pipeline (§7 "Propagation policy").
fn coerce_hop(result: PipelineResult) -> PipelineResult {
    result.map(|boxed| Box::new(boxed.into_response()) as Box<dyn IntoResponse + Send>)
}

/// Run the server-install phase over `middlewares`, in declared order,
/// returning the teardown stack. `uninstall` drains it in reverse,
/// giving LIFO teardown "for free" because nothing else can run
/// concurrently with this synchronous pass (§4.D "Ordering guarantee").
pub fn dispatch_server_install<C>(middlewares: &[Box<dyn Middleware<C>>]) -> Vec<Teardown> {
    let mut teardown = Vec::new();
    for mw in middlewares {
        mw.process_server(&mut teardown);
    }
    teardown
}

/// Run the server-uninstall phase: drain the teardown stack built by
/// [`dispatch_server_install`] in reverse (LIFO) order.
pub fn dispatch_server_uninstall(teardown: Vec<Teardown>) {
    for f in teardown.into_iter().rev() {
        f();
    }
}

/// Entry point for one request: runs the request phase, then (if no
/// middleware short-circuits) the view phase, then formats any error into
/// a `Response` exactly once (§7 "all errors inside the pipeline are
/// caught by the engine and converted to responses").
pub fn dispatch_pipeline<C>(
    middlewares: &Arc<Vec<Box<dyn Middleware<C>>>>,
    router: &dyn Router<C>,
    request: RawRequest,
    context: &mut C,
    debug: bool,
    is_external: bool,
) -> Response {
    match dispatch_request(middlewares, 0, router, request, context) {
        Ok(boxed) => boxed.into_response(),
        Err(err) => err.into_response(debug, is_external),
    }
}

fn dispatch_request<C>(
    middlewares: &Arc<Vec<Box<dyn Middleware<C>>>>,
    index: usize,
    router: &dyn Router<C>,
    request: RawRequest,
    context: &mut C,
) -> PipelineResult {
    match middlewares.get(index) {
        Some(mw) => {
            trace!("request phase: entering middleware {}", index);
            let middlewares = middlewares.clone();
            let mut next = move |request: RawRequest, context: &mut C| -> PipelineResult {
                coerce_hop(dispatch_request(&middlewares, index + 1, router, request, context))
            };
            catch_panic(|| mw.process_request(request, context, &mut next))
        }
        None => dispatch_view_entry(middlewares, router, request, context),
    }
}

fn dispatch_view_entry<C>(
    middlewares: &Arc<Vec<Box<dyn Middleware<C>>>>,
    router: &dyn Router<C>,
    request: RawRequest,
    context: &mut C,
) -> PipelineResult {
    let route_match = match router.route(&request) {
        Some(m) => m,
        None => {
            return Err(PipelineError::not_found(
                request.method.as_str(),
                &request.path,
            ))
        }
    };
    if !route_match.controller.has(&route_match.name) {
        return Err(PipelineError::not_implemented(
            request.method.as_str(),
            &request.path,
        ));
    }
    let mut request = request;
    request.params.extend(route_match.params);
    dispatch_view(
        middlewares,
        0,
        &request,
        &route_match.controller,
        &route_match.name,
        context,
    )
}

fn dispatch_view<C>(
    middlewares: &Arc<Vec<Box<dyn Middleware<C>>>>,
    index: usize,
    request: &RawRequest,
    controller: &Controller<C>,
    name: &str,
    context: &mut C,
) -> PipelineResult {
    match middlewares.get(index) {
        Some(mw) => {
            trace!("view phase: entering middleware {}", index);
            let middlewares = middlewares.clone();
            let mut next =
                move |request: &RawRequest, controller: &Controller<C>, name: &str, context: &mut C| -> PipelineResult {
                    coerce_hop(dispatch_view(&middlewares, index + 1, request, controller, name, context))
                };
            catch_panic(|| mw.process_view(request, controller, name, context, &mut next))
        }
        None => catch_panic(|| controller.invoke(name, request, context)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::router::ControllerBuilder;
    use std::sync::Mutex;

    struct LoggingMiddleware {
        id: u32,
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl Middleware<()> for LoggingMiddleware {
        fn process_request(
            &self,
            request: RawRequest,
            context: &mut (),
            next: &mut RequestNext<'_, ()>,
        ) -> PipelineResult {
            self.log.lock().unwrap().push(self.id);
            let result = next(request, context);
            self.log.lock().unwrap().push(self.id);
            result
        }
    }

    #[test]
    fn test_request_phase_order_is_declared_then_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let middlewares: Arc<Vec<Box<dyn Middleware<()>>>> = Arc::new(vec![
            Box::new(LoggingMiddleware { id: 1, log: log.clone() }),
            Box::new(LoggingMiddleware { id: 2, log: log.clone() }),
            Box::new(LoggingMiddleware { id: 3, log: log.clone() }),
        ]);
        let controller = ControllerBuilder::<()>::new()
            .get(|_req, _ctx| Ok(Box::new("hi there!".to_string()) as Box<dyn IntoResponse + Send>))
            .build();
        let router = crate::router::PathRouter::new().with_route("/", controller);
        let request = RawRequest::default();
        let mut context = ();
        let response = dispatch_pipeline(&middlewares, &router, request, &mut context, false, true);
        assert_eq!(response.status_code(), 200);
        assert_eq!(&log.lock().unwrap()[..], &[1, 2, 3, 3, 2, 1]);
    }

    #[test]
    fn test_short_circuit_skips_view_phase() {
        struct ShortCircuit;
        impl Middleware<()> for ShortCircuit {
            fn process_request(
                &self,
                _request: RawRequest,
                _context: &mut (),
                _next: &mut RequestNext<'_, ()>,
            ) -> PipelineResult {
                Ok(Box::new("short-circuited".to_string()))
            }
        }
        let middlewares: Arc<Vec<Box<dyn Middleware<()>>>> = Arc::new(vec![Box::new(ShortCircuit)]);
        let router = crate::router::PathRouter::<()>::new();
        let response = dispatch_pipeline(
            &middlewares,
            &router,
            RawRequest::default(),
            &mut (),
            false,
            true,
        );
        assert_eq!(response.status_code(), 200);
    }

    #[test]
    fn test_non_error_panic_becomes_500() {
        struct Panics;
        impl Middleware<()> for Panics {
            fn process_request(
                &self,
                _request: RawRequest,
                _context: &mut (),
                _next: &mut RequestNext<'_, ()>,
            ) -> PipelineResult {
                panic!("not an error");
            }
        }
        let middlewares: Arc<Vec<Box<dyn Middleware<()>>>> = Arc::new(vec![Box::new(Panics)]);
        let router = crate::router::PathRouter::<()>::new();
        let response = dispatch_pipeline(
            &middlewares,
            &router,
            RawRequest::default(),
            &mut (),
            false,
            true,
        );
        assert_eq!(response.status_code(), 500);
    }

    #[test]
    fn test_no_route_match_is_404() {
        let middlewares: Arc<Vec<Box<dyn Middleware<()>>>> = Arc::new(vec![]);
        let router = crate::router::PathRouter::<()>::new();
        let response = dispatch_pipeline(
            &middlewares,
            &router,
            RawRequest::default(),
            &mut (),
            false,
            true,
        );
        assert_eq!(response.status_code(), 404);
    }

    #[test]
    fn test_install_uninstall_lifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
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
        let middlewares: Vec<Box<dyn Middleware<()>>> = vec![
            Box::new(ServerMw { id: 1, log: log.clone() }),
            Box::new(ServerMw { id: 2, log: log.clone() }),
            Box::new(ServerMw { id: 3, log: log.clone() }),
        ];
        let teardown = dispatch_server_install(&middlewares);
        dispatch_server_uninstall(teardown);
        assert_eq!(&log.lock().unwrap()[..], &[1, 2, 3, 3, 2, 1]);
    }
}
