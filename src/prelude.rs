pub use crate::api::Api;
pub use crate::auth::{require_auth, AuthError};
pub use crate::error::{HandlerError, PipelineError};
pub use crate::handler::DirectoryHandler;
pub use crate::metrics::{MetricsSink, NullMetricsSink, RequestMetric, TcpMetricsSink};
pub use crate::middleware::{Middleware, PipelineResult, Teardown};
pub use crate::request::{Header, Method, Param, RawRequest, Request};
pub use crate::response::{Body, ByteStream, IntoResponse, Json, ObjectStream, Response};
pub use crate::router::{Controller, ControllerBuilder, PathRouter, RouteMatch, Router};
pub use crate::server::{serve, HttpListener, ServerHandle, ServerOptions, StreamHttpListener, TcpHttpListener};
