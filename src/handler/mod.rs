//! Built-in view-phase handlers that don't need their own module.
//!
//! A handler itself is just `crate::router::HandlerFn<C>`: any
//! `Fn(&RawRequest, &mut C) -> PipelineResult`. This module holds handlers
//! substantial enough to deserve their own type rather than a closure.
pub mod directory;

pub use directory::DirectoryHandler;
