//! Static file serving module
//!
//! Serves the index file for the root route and everything under the static
//! prefix. Files are read from disk on every request.

use crate::config::AppState;
use crate::error::ServeError;
use crate::handler::resolve;
use crate::handler::router::RequestContext;
use crate::http::{self, cache, mime, HttpResponse};
use crate::logger;
use hyper::body::Bytes;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// File contents plus the metadata needed for response headers
#[derive(Debug)]
pub struct LoadedFile {
    pub content: Bytes,
    pub content_type: &'static str,
    pub etag: String,
    pub last_modified: Option<String>,
}

/// Serve the index file from the frontend directory root
///
/// `index_file` is a plain file name, so the path is read as-is and may be a
/// symlink to a build output elsewhere. Always served as HTML.
pub async fn serve_index(state: &AppState) -> HttpResponse {
    let path = state.frontend_dir.join(&state.config.frontend.index_file);
    let loaded = match fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => load_file(&path).await,
        _ => Err(ServeError::NotFound),
    };

    match loaded {
        Ok(file) => http::build_file_response(
            file.content,
            mime::HTML,
            &file.etag,
            file.last_modified.as_deref(),
        ),
        Err(e) => error_response(&e),
    }
}

/// Serve a file below the static prefix
///
/// `relative` is the raw (still percent-encoded) path after the prefix.
pub async fn serve_static(
    ctx: &RequestContext,
    state: &AppState,
    relative: &str,
) -> HttpResponse {
    match load_static(&state.frontend_dir, relative).await {
        Ok(file) => {
            if cache::check_etag_match(ctx.if_none_match.as_deref(), &file.etag) {
                return http::build_304_response(&file.etag, file.last_modified.as_deref());
            }
            http::build_file_response(
                file.content,
                file.content_type,
                &file.etag,
                file.last_modified.as_deref(),
            )
        }
        Err(e) => error_response(&e),
    }
}

async fn load_static(root: &Path, relative: &str) -> Result<LoadedFile, ServeError> {
    let decoded = resolve::percent_decode(relative)?;
    let relative = resolve::sanitize_relative_path(&decoded)?;
    if relative.as_os_str().is_empty() {
        return Err(ServeError::NotFound);
    }

    let path = resolve::resolve_within(root, &relative).await?;
    load_file(&path).await
}

/// Read a file and compute its validators
pub async fn load_file(path: &Path) -> Result<LoadedFile, ServeError> {
    let content = fs::read(path).await.map_err(|source| match source.kind() {
        ErrorKind::NotFound => ServeError::NotFound,
        _ => ServeError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let last_modified = fs::metadata(path)
        .await
        .ok()
        .and_then(|meta| meta.modified().ok())
        .map(cache::format_http_date);

    Ok(LoadedFile {
        etag: cache::generate_etag(&content),
        content: Bytes::from(content),
        content_type: mime::content_type_for(path),
        last_modified,
    })
}

fn error_response(err: &ServeError) -> HttpResponse {
    match err {
        ServeError::Forbidden(_) => {
            logger::log_warning(&format!("Path traversal attempt blocked: {err}"));
        }
        ServeError::Io { .. } => logger::log_error(&err.to_string()),
        ServeError::NotFound | ServeError::BadRequest(_) => {}
    }
    http::build_error_response(err)
}
