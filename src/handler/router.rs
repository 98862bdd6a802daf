//! Request routing dispatch module
//!
//! Entry point for HTTP request processing, responsible for method validation,
//! route matching, dispatching and access logging.

use crate::config::AppState;
use crate::handler::{health, static_files};
use crate::http::{self, HttpResponse};
use crate::logger::{self, AccessLogEntry};
use hyper::body::Body;
use hyper::header::{HeaderValue, IF_NONE_MATCH, SERVER};
use hyper::{Method, Request};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request data the handlers need, detached from the request body
pub struct RequestContext {
    pub path: String,
    pub if_none_match: Option<String>,
}

impl RequestContext {
    fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            path: req.uri().path().to_string(),
            if_none_match: req
                .headers()
                .get(IF_NONE_MATCH)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
        }
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: Option<SocketAddr>,
) -> Result<HttpResponse, Infallible> {
    let started = Instant::now();
    let logging = &state.config.logging;
    let mut entry = logging
        .access_log
        .then(|| AccessLogEntry::from_request(&req, remote_addr));

    let method = req.method().clone();
    let is_head = method == Method::HEAD;
    let ctx = RequestContext::from_request(&req);
    drop(req);

    let mut response = match match_route(&ctx.path, &state) {
        Route::NotFound => http::build_404_response(),
        _ if method != Method::GET && !is_head => {
            logger::log_debug(&format!("Method not allowed: {method} {}", ctx.path));
            http::build_405_response()
        }
        Route::Health => health::serve_health(),
        Route::Index => static_files::serve_index(&state).await,
        Route::Static(relative) => static_files::serve_static(&ctx, &state, relative).await,
    };

    if let Ok(name) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert(SERVER, name);
    }

    if is_head {
        response = http::strip_body(response);
    }

    if let Some(entry) = entry.as_mut() {
        let body_bytes = response.body().size_hint().exact().unwrap_or(0);
        entry.complete(response.status().as_u16(), body_bytes, started.elapsed());
        logger::log_access(entry, &logging.access_log_format);
    }

    Ok(response)
}

/// Handler a request path maps to
enum Route<'a> {
    Health,
    Index,
    /// Raw path after the static prefix and its slash
    Static(&'a str),
    NotFound,
}

/// Match a path against the configured routes
fn match_route<'a>(path: &'a str, state: &AppState) -> Route<'a> {
    let routes = &state.config.routes;

    if path == routes.health_path {
        return Route::Health;
    }

    if path == "/" {
        return Route::Index;
    }

    path.strip_prefix(routes.static_prefix.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
        .map_or(Route::NotFound, Route::Static)
}
