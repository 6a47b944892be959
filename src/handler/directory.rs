//! A view-phase handler that serves files under a root directory.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::PipelineError;
use crate::middleware::PipelineResult;
use crate::request::RawRequest;
use crate::response::{Body, IntoResponse, Response};

/// Serves files under `root`, returning a [`PipelineResult`] so it can be
/// registered directly on a [`crate::router::ControllerBuilder`]:
/// `.get(move |req, ctx| handler.serve(req, ctx))`.
pub struct DirectoryHandler {
    root: PathBuf,
}

impl DirectoryHandler {
    /// `root` must exist; it is canonicalized up front so every served
    /// path can be compared against it directly.
    pub fn new(root: &Path) -> io::Result<Self> {
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve the file or directory listing at `request.path`, relative to
    /// `root`. `context` is accepted but unused, so this fits any
    /// `HandlerFn<C>`.
    pub fn serve<C>(&self, request: &RawRequest, _context: &mut C) -> PipelineResult {
        let relative = request.path.trim_start_matches('/');
        let filepath = match self.root.join(relative).canonicalize() {
            Ok(p) => p,
            Err(_) => return Err(PipelineError::handler(400, "invalid path")),
        };

        // Prevent serving files above root via path traversals like
        // ../../../etc/passwd.
        if !is_parent(&self.root, &filepath) {
            warn!("path traversal attempted: {:?}", &filepath);
            return Err(PipelineError::not_found(request.method.as_str(), &request.path));
        }

        let (contents, content_type) = if filepath.is_file() {
            match fs::read(&filepath) {
                Ok(contents) => (contents, "application/octet-stream"),
                Err(_) => {
                    return Err(PipelineError::not_found(request.method.as_str(), &request.path))
                }
            }
        } else if filepath.is_dir() {
            match list_directory(&filepath) {
                Ok(listing) => (listing, "text/plain"),
                Err(_) => {
                    return Err(PipelineError::not_found(request.method.as_str(), &request.path))
                }
            }
        } else {
            return Err(PipelineError::not_found(request.method.as_str(), &request.path));
        };

        let response = Response::make(Body::Bytes(contents), None, vec![])
            .with_header("Content-Type", content_type);
        Ok(Box::new(response) as Box<dyn IntoResponse + Send>)
    }
}

fn list_directory(dir: &Path) -> io::Result<Vec<u8>> {
    let mut names = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.path().file_name() {
            names.push(name.to_string_lossy().into_owned());
        }
    }
    names.push("".to_string());
    Ok(names.join("\n").into_bytes())
}

/// Check if root is parent of target. Both must be canonical.
fn is_parent(root: &Path, target: &Path) -> bool {
    let mut curr = target;
    loop {
        if curr == root {
            return true;
        }
        curr = match curr.parent() {
            Some(parent) => parent,
            None => return false,
        };
    }
}
