//! Liveness endpoint

use crate::http::{self, HttpResponse};
use hyper::StatusCode;
use serde::Serialize;

/// Body of the health response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// Always `200 {"status": "ok"}` while the process is alive
pub fn serve_health() -> HttpResponse {
    http::build_json_response(StatusCode::OK, &HealthStatus { status: "ok" })
}
