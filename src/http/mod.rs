//! HTTP protocol layer module
//!
//! Content types, validators and response builders, independent of routing.

pub mod cache;
pub mod mime;
pub mod response;

// Re-export commonly used items
pub use response::{
    build_304_response, build_404_response, build_405_response, build_error_response,
    build_file_response, build_json_response, strip_body, HttpResponse,
};
