//! Base for APIs keyed by HTTP verb (§[SUPPLEMENT]): default-405
//! get/post/put/patch/delete methods, plus a builder for the
//! [`Controller`] the pipeline dispatches through.
use std::sync::Arc;

use crate::error::PipelineError;
use crate::middleware::PipelineResult;
use crate::request::RawRequest;
use crate::router::{Controller, ControllerBuilder};

fn not_implemented() -> PipelineResult {
    Err(PipelineError::handler(405, "Method Not Allowed"))
}

/// Implement `get`/`post`/`put`/`patch`/`delete` to handle requests with
/// the corresponding HTTP verb; methods left at their default answer 405.
pub trait Api<C> {
    fn get(&self, _request: &RawRequest, _context: &mut C) -> PipelineResult {
        not_implemented()
    }
    fn post(&self, _request: &RawRequest, _context: &mut C) -> PipelineResult {
        not_implemented()
    }
    fn put(&self, _request: &RawRequest, _context: &mut C) -> PipelineResult {
        not_implemented()
    }
    fn patch(&self, _request: &RawRequest, _context: &mut C) -> PipelineResult {
        not_implemented()
    }
    fn delete(&self, _request: &RawRequest, _context: &mut C) -> PipelineResult {
        not_implemented()
    }

    /// Build a [`Controller`] dispatching each HTTP verb name to the
    /// corresponding method above.
    fn controller(self) -> Controller<C>
    where
        Self: 'static + Sized + Send + Sync,
        C: 'static,
    {
        let this = Arc::new(self);
        let (g, p, pu, pa, d) = (this.clone(), this.clone(), this.clone(), this.clone(), this);
        ControllerBuilder::new()
            .get(move |req, ctx| g.get(req, ctx))
            .post(move |req, ctx| p.post(req, ctx))
            .put(move |req, ctx| pu.put(req, ctx))
            .patch(move |req, ctx| pa.patch(req, ctx))
            .delete(move |req, ctx| d.delete(req, ctx))
            .build()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::IntoResponse;

    struct GetOnly;

    impl Api<()> for GetOnly {
        fn get(&self, _request: &RawRequest, _context: &mut ()) -> PipelineResult {
            Ok(Box::new("hi".to_string()) as Box<dyn IntoResponse + Send>)
        }
    }

    #[test]
    fn test_overridden_verb_runs() {
        let controller = GetOnly.controller();
        let mut ctx = ();
        let result = controller
            .invoke("GET", &RawRequest::default(), &mut ctx)
            .unwrap();
        assert_eq!(result.into_response().status_code(), 200);
    }

    #[test]
    fn test_default_verb_is_405() {
        let controller = GetOnly.controller();
        let mut ctx = ();
        let err = controller
            .invoke("POST", &RawRequest::default(), &mut ctx)
            .unwrap_err();
        assert_eq!(err.status(), 405);
    }
}
