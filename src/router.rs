//! Path-based request routing and the controller ("mapping name->handler",
//! §3 "Route match") the router resolves against.
use std::collections::HashMap;
use std::sync::Arc;

use crate::middleware::PipelineResult;
use crate::request::{Param, Params, RawRequest};

/// A handler: request (with route params already merged in) plus context
/// in, a coercible value or [`crate::error::PipelineError`] out.
pub type HandlerFn<C> = dyn Fn(&RawRequest, &mut C) -> PipelineResult + Send + Sync;

/// "controller: mapping name->handler" (§3). Names are conventionally HTTP
/// method strings (`"GET"`, `"POST"`, ...) per [`ControllerBuilder`], but
/// the router itself is agnostic to what a name means.
pub struct Controller<C> {
    handlers: HashMap<String, Box<HandlerFn<C>>>,
}

impl<C> Controller<C> {
    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Invoke the handler registered under `name`. Panics if `name` is
    /// absent; callers must check [`Controller::has`] first (the pipeline
    /// does, raising [`crate::error::PipelineError::NotImplemented`]
    /// instead).
    pub fn invoke(&self, name: &str, request: &RawRequest, context: &mut C) -> PipelineResult {
        (self.handlers.get(name).expect("checked by has() before invoke"))(request, context)
    }
}

/// Builds a [`Controller`] from per-HTTP-verb closures (§[SUPPLEMENT]).
pub struct ControllerBuilder<C> {
    handlers: HashMap<String, Box<HandlerFn<C>>>,
}

impl<C> ControllerBuilder<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn with_handler<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&RawRequest, &mut C) -> PipelineResult + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(f));
        self
    }

    pub fn get<F>(self, f: F) -> Self
    where
        F: Fn(&RawRequest, &mut C) -> PipelineResult + Send + Sync + 'static,
    {
        self.with_handler("GET", f)
    }

    pub fn post<F>(self, f: F) -> Self
    where
        F: Fn(&RawRequest, &mut C) -> PipelineResult + Send + Sync + 'static,
    {
        self.with_handler("POST", f)
    }

    pub fn put<F>(self, f: F) -> Self
    where
        F: Fn(&RawRequest, &mut C) -> PipelineResult + Send + Sync + 'static,
    {
        self.with_handler("PUT", f)
    }

    pub fn patch<F>(self, f: F) -> Self
    where
        F: Fn(&RawRequest, &mut C) -> PipelineResult + Send + Sync + 'static,
    {
        self.with_handler("PATCH", f)
    }

    pub fn delete<F>(self, f: F) -> Self
    where
        F: Fn(&RawRequest, &mut C) -> PipelineResult + Send + Sync + 'static,
    {
        self.with_handler("DELETE", f)
    }

    pub fn build(self) -> Controller<C> {
        Controller {
            handlers: self.handlers,
        }
    }
}

impl<C> Default for ControllerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Route match (§3): the resolved controller, the name to look up in it
/// (conventionally the HTTP method), and any path params extracted along
/// the way.
pub struct RouteMatch<C> {
    pub controller: Arc<Controller<C>>,
    pub name: String,
    pub params: Params,
}

/// The router interface (§6, consumed): synchronous `request -> match |
/// None`.
pub trait Router<C>: Send + Sync {
    fn route(&self, request: &RawRequest) -> Option<RouteMatch<C>>;
}

enum RoutePart {
    Exact(String),
    Param(String),
    Any,
}

impl RoutePart {
    fn from_str(s: &str) -> Self {
        if s == "*" {
            Self::Any
        } else if let Some(s) = s.strip_prefix('?') {
            Self::Param(s.to_string())
        } else {
            Self::Exact(s.to_string())
        }
    }
    fn matches(&self, s: &str) -> (bool, Option<(String, String)>) {
        match self {
            Self::Exact(p) => (s == &p[..], None),
            Self::Any => (true, None),
            Self::Param(p) => (true, Some((p.clone(), s.to_string()))),
        }
    }
}

struct RoutePath {
    parts: Vec<RoutePart>,
    is_prefix: bool,
}

impl RoutePath {
    fn from_str(s: &str) -> Self {
        let mut route_parts = vec![];
        let mut is_prefix = false;
        let parts = match s.ends_with("**") {
            true => {
                is_prefix = true;
                s[..s.len() - 2].split('/')
            }
            false => s.split('/'),
        };
        for part in parts {
            route_parts.push(RoutePart::from_str(part));
        }
        Self {
            parts: route_parts,
            is_prefix,
        }
    }
    fn matches(&self, s: &str) -> (bool, Vec<(String, String)>) {
        let parts: Vec<&str> = s.split('/').collect();
        let mut params = vec![];

        if parts.len() < self.parts.len() {
            return (false, params);
        }
        if parts.len() > self.parts.len() && !self.is_prefix {
            return (false, params);
        }

        for (i, part) in parts.iter().enumerate() {
            let (matches, param) = self.parts[i].matches(part);
            if !matches {
                return (false, params);
            }
            if let Some((name, val)) = param {
                params.push((name, val));
            }
        }
        (true, params)
    }
}

/// Path-pattern router (§6 "`Router<C>` trait + `PathRouter<C>`"),
/// dispatching by request path only; `name` in the resulting
/// [`RouteMatch`] is the request's HTTP method.
///
/// # Usage - route patterns
/// * `/foo`: matches exactly /foo
/// * `/foo/*/bar`: matches /foo/anything/bar
/// * `/foo/**`: matches /foo/bar/... (only at end of route)
/// * `/foo/?name`: matches /foo/bar, adding a `name` path param
pub struct PathRouter<C> {
    routes: Vec<(RoutePath, Arc<Controller<C>>)>,
}

impl<C> PathRouter<C> {
    pub fn new() -> Self {
        Self { routes: vec![] }
    }

    pub fn with_route(mut self, path: &str, controller: Controller<C>) -> Self {
        self.routes.push((RoutePath::from_str(path), Arc::new(controller)));
        self
    }
}

impl<C> Default for PathRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + Sync> Router<C> for PathRouter<C> {
    fn route(&self, request: &RawRequest) -> Option<RouteMatch<C>> {
        for (path, controller) in &self.routes {
            let (matches, params) = path.matches(&request.path);
            if matches {
                let mut route_params = Params::new();
                for (name, val) in params {
                    route_params.add(Param::Path(name), val);
                }
                return Some(RouteMatch {
                    controller: controller.clone(),
                    name: request.method.as_str().to_string(),
                    params: route_params,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::IntoResponse;

    fn ok_controller() -> Controller<()> {
        ControllerBuilder::new()
            .get(|_req, _ctx| Ok(Box::new("hi".to_string()) as Box<dyn IntoResponse + Send>))
            .build()
    }

    #[test]
    fn test_exact_match() {
        let router = PathRouter::new().with_route("/hello", ok_controller());
        let mut request = RawRequest::default();
        request.path = "/hello".to_string();
        let m = router.route(&request).unwrap();
        assert_eq!(m.name, "GET");
        assert!(m.controller.has("GET"));
    }

    #[test]
    fn test_no_match_is_none() {
        let router = PathRouter::new().with_route("/hello", ok_controller());
        let mut request = RawRequest::default();
        request.path = "/bye".to_string();
        assert!(router.route(&request).is_none());
    }

    #[test]
    fn test_param_match() {
        let router = PathRouter::new().with_route("/person/?id", ok_controller());
        let mut request = RawRequest::default();
        request.path = "/person/42".to_string();
        let m = router.route(&request).unwrap();
        assert_eq!(
            m.params.get_first(&Param::Path("id".to_string())),
            Some(&"42".to_string())
        );
    }

    #[test]
    fn test_missing_handler_name() {
        let router = PathRouter::new().with_route("/hello", ok_controller());
        let mut request = RawRequest::default();
        request.path = "/hello".to_string();
        request.method = crate::request::Method::POST;
        let m = router.route(&request).unwrap();
        assert!(!m.controller.has(&m.name));
    }
}
