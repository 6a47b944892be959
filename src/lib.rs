//! A synchronous, three-phase middleware pipeline and response coercion
//! engine for HTTP servers. This is a learning project, use at your own risk.
//! * Multi-threaded [TCP listener](crate::server::TcpHttpListener)
//! * Server-install / request / view [middleware pipeline](crate::middleware)
//! * Coercion of handler return values into [Responses](crate::response::Response)
//! * Path-based [request routing](crate::router::Router)
//! * HTTP-verb [APIs](crate::api::Api)
//!
//! # Example
//! ```
//! use midware::middleware::{dispatch_pipeline, Middleware};
//! use midware::request::RawRequest;
//! use midware::response::{IntoResponse, Json};
//! use midware::router::{Controller, ControllerBuilder, PathRouter};
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Serialize)]
//! struct Person {
//!     name: String,
//! }
//!
//! fn controller() -> Controller<()> {
//!     ControllerBuilder::new()
//!         .get(|req, _ctx| {
//!             let name = req
//!                 .params
//!                 .get_any("name")
//!                 .cloned()
//!                 .unwrap_or_else(|| "John".to_string());
//!             Ok(Box::new(Json(Person { name })) as Box<dyn IntoResponse + Send>)
//!         })
//!         .build()
//! }
//!
//! let router = PathRouter::new().with_route("/person/?name", controller());
//! let middlewares: Arc<Vec<Box<dyn Middleware<()>>>> = Arc::new(vec![]);
//! let mut request = RawRequest::default();
//! request.path = "/person/Bob".to_string();
//!
//! let response = dispatch_pipeline(&middlewares, &router, request, &mut (), false, true);
//! assert_eq!(response.status_code(), 200);
//! ```
pub mod api;
pub mod auth;
pub mod error;
pub mod handler;
pub mod io;
pub mod metrics;
pub mod middleware;
pub mod prelude;
pub mod request;
pub mod response;
pub mod router;
pub mod runner;
pub mod server;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
