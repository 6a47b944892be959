//! Authentication guard (§[SUPPLEMENT]): a view-phase [`Middleware`]
//! that rejects a request before it reaches the matched handler, since
//! the pipeline dispatches handlers by name through a
//! [`crate::router::Controller`] rather than by direct composition
//! around a single handler.
use std::fmt;

use crate::error::PipelineError;
use crate::middleware::{Middleware, PipelineResult};
use crate::request::RawRequest;
use crate::router::Controller;

#[derive(Debug)]
pub struct AuthError {
    reason: String,
}

impl AuthError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for AuthError {}

/// View-phase middleware rejecting requests with 401 unless `check`
/// passes. Runs for every route this middleware is installed in front
/// of, as a blanket guard rather than a per-handler decoration.
pub struct RequireAuth<F> {
    check: F,
}

/// Build a [`RequireAuth`] middleware from an auth-check closure.
pub fn require_auth<F, C>(check: F) -> RequireAuth<F>
where
    F: Fn(&RawRequest, &mut C) -> Result<(), AuthError> + Send + Sync,
{
    RequireAuth { check }
}

impl<F, C> Middleware<C> for RequireAuth<F>
where
    F: Fn(&RawRequest, &mut C) -> Result<(), AuthError> + Send + Sync,
{
    fn process_view(
        &self,
        request: &RawRequest,
        controller: &Controller<C>,
        name: &str,
        context: &mut C,
        next: &mut (dyn FnMut(&RawRequest, &Controller<C>, &str, &mut C) -> PipelineResult + '_),
    ) -> PipelineResult {
        match (self.check)(request, context) {
            Ok(()) => next(request, controller, name, context),
            Err(e) => Err(PipelineError::handler(401, e.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::IntoResponse;
    use crate::router::{ControllerBuilder, PathRouter};
    use std::sync::Arc;

    #[test]
    fn test_rejects_with_401_when_check_fails() {
        let middlewares: Vec<Box<dyn Middleware<()>>> = vec![Box::new(require_auth(
            |_req: &RawRequest, _ctx: &mut ()| Err(AuthError::new("no token")),
        ))];
        let controller = ControllerBuilder::<()>::new()
            .get(|_req, _ctx| Ok(Box::new("secret".to_string()) as Box<dyn IntoResponse + Send>))
            .build();
        let router = PathRouter::new().with_route("/", controller);
        let response = crate::middleware::dispatch_pipeline(
            &Arc::new(middlewares),
            &router,
            RawRequest::default(),
            &mut (),
            false,
            true,
        );
        assert_eq!(response.status_code(), 401);
    }

    #[test]
    fn test_passes_through_when_check_succeeds() {
        let middlewares: Vec<Box<dyn Middleware<()>>> =
            vec![Box::new(require_auth(|_req: &RawRequest, _ctx: &mut ()| Ok(())))];
        let controller = ControllerBuilder::<()>::new()
            .get(|_req, _ctx| Ok(Box::new("secret".to_string()) as Box<dyn IntoResponse + Send>))
            .build();
        let router = PathRouter::new().with_route("/", controller);
        let response = crate::middleware::dispatch_pipeline(
            &Arc::new(middlewares),
            &router,
            RawRequest::default(),
            &mut (),
            false,
            true,
        );
        assert_eq!(response.status_code(), 200);
    }
}
