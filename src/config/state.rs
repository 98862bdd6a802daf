// Application state module
// Immutable per-process state shared by every connection

use std::path::PathBuf;

use super::types::Config;

/// Application state
pub struct AppState {
    pub config: Config,
    /// Frontend directory resolved at startup
    pub frontend_dir: PathBuf,
}

impl AppState {
    pub const fn new(config: Config, frontend_dir: PathBuf) -> Self {
        Self {
            config,
            frontend_dir,
        }
    }
}
