//! Request handler module
//!
//! Routes requests to the health, index and static asset handlers.

pub mod health;
pub mod resolve;
pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
