//! Static file serving.
//!
//! [`StaticFiles`] serves the file named by the catch-all `path` parameter
//! from a root directory:
//!
//! - directories are served through their `index.html`
//! - `..` segments and hidden files (leading `.`) are forbidden
//! - resolved paths must stay inside the root, symlinks included
//! - content goes out through [`Resp::file`](crate::Resp::file), so
//!   `Last-Modified`, `If-Modified-Since`, `Range` and `HEAD` all apply

use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use meridian_core::{HttpError, HttpResult};
use meridian_router::CATCH_ALL_PARAM;
use thiserror::Error;

use crate::handler::{BoxFuture, Handler};
use crate::request::Req;
use crate::response::HttpResponse;

const INDEX_FILE: &str = "index.html";

/// Reasons a static file cannot be served.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// Nothing to serve at the path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path is not allowed.
    #[error("forbidden path: {0}")]
    Forbidden(String),

    /// Reading the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StaticFileError> for HttpError {
    fn from(err: StaticFileError) -> Self {
        match err {
            StaticFileError::NotFound(_) => Self::NotFound,
            StaticFileError::Forbidden(_) => Self::NotFound,
            StaticFileError::Io(err) => Self::internal(err),
        }
    }
}

/// Serves files from a directory.
///
/// Usually mounted with [`Router::static_files`](crate::Router::static_files).
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Serves files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Type-erased handler for [`Router::route`](crate::Router::route).
    pub fn handler(self) -> Arc<dyn Handler> {
        Arc::new(self)
    }

    fn serve(&self, req: &Req) -> HttpResult<HttpResponse> {
        let requested = req.param(CATCH_ALL_PARAM).unwrap_or_default();
        let path = match self.resolve(requested) {
            Ok(path) => path,
            Err(StaticFileError::Forbidden(reason)) => {
                tracing::debug!(path = requested, reason = %reason, "forbidden static path");
                return Ok(req.resp().error("403 Forbidden", StatusCode::FORBIDDEN));
            }
            Err(err) => return Err(err.into()),
        };

        let path = if path.is_dir() {
            let index = path.join(INDEX_FILE);
            if !index.is_file() {
                return Err(HttpError::NotFound);
            }
            index
        } else {
            path
        };

        let file = File::open(&path).map_err(StaticFileError::Io)?;
        let modified = file.metadata().and_then(|meta| meta.modified()).ok();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        req.resp().file(req, name, modified, file)
    }

    // Maps a request path to a file below the root.
    fn resolve(&self, requested: &str) -> Result<PathBuf, StaticFileError> {
        let relative = requested.trim_start_matches('/');

        for component in Path::new(relative).components() {
            match component {
                Component::ParentDir => {
                    return Err(StaticFileError::Forbidden("directory traversal".to_string()));
                }
                Component::Normal(name) if name.to_string_lossy().starts_with('.') => {
                    return Err(StaticFileError::Forbidden("hidden file".to_string()));
                }
                _ => {}
            }
        }

        let not_found = || StaticFileError::NotFound(requested.to_string());
        let canonical = self.root.join(relative).canonicalize().map_err(|_| not_found())?;
        let root = self.root.canonicalize().map_err(|_| not_found())?;
        if !canonical.starts_with(&root) {
            return Err(StaticFileError::Forbidden("outside the root".to_string()));
        }
        Ok(canonical)
    }
}

impl Handler for StaticFiles {
    fn call(&self, req: Req) -> BoxFuture<HttpResult<HttpResponse>> {
        let files = self.clone();
        Box::pin(async move { files.serve(&req) })
    }
}
