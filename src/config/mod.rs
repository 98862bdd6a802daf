// Configuration module entry point
// Loads layered configuration and resolves the frontend directory

mod state;
mod types;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::builder::DefaultState;
use config::ConfigBuilder;

use crate::error::ConfigError;
use crate::logger::LogLevel;

// Re-export public types
pub use state::AppState;
pub use types::{Config, LoggingConfig};

/// Name of the directory searched for next to the executable
pub const FRONTEND_DIR_NAME: &str = "frontend";

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let settings = Self::builder()?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Builder preloaded with every default value
    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000)?
            .set_default("frontend.index_file", "index.html")?
            .set_default("routes.static_prefix", "/static")?
            .set_default("routes.health_path", "/health")?
            .set_default("http.server_name", env!("CARGO_PKG_NAME"))?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }

        let prefix = &self.routes.static_prefix;
        if !prefix.starts_with('/') || prefix == "/" || prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "routes.static_prefix must look like '/static', got '{prefix}'"
            )));
        }

        let health = &self.routes.health_path;
        if !health.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "routes.health_path must start with '/', got '{health}'"
            )));
        }
        if health == "/"
            || health == prefix
            || health.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "routes.health_path '{health}' overlaps the root or static route"
            )));
        }

        let index = &self.frontend.index_file;
        if index.is_empty() || index.contains(['/', '\\']) || index == ".." {
            return Err(ConfigError::Invalid(format!(
                "frontend.index_file must be a plain file name, got '{index}'"
            )));
        }

        LogLevel::from_str(&self.logging.level).map_err(ConfigError::Invalid)?;

        let perf = &self.performance;
        if perf.read_timeout == 0 || perf.write_timeout == 0 {
            return Err(ConfigError::Invalid(
                "performance.read_timeout and write_timeout must be positive".into(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|source| ConfigError::Address { addr, source })
    }

    #[cfg(test)]
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Self = Self::builder()?
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Resolve the frontend directory
///
/// An explicit `configured` path wins. Otherwise the executable's directory
/// and its ancestors are searched, nearest first, for a `frontend` child
/// directory. Falls back to the `frontend` sibling of the executable's
/// directory even when it does not exist yet.
pub fn resolve_frontend_dir(configured: Option<&str>, exe: &Path) -> PathBuf {
    if let Some(dir) = configured {
        return PathBuf::from(dir);
    }

    let exe_dir = exe.parent().unwrap_or_else(|| Path::new("."));

    exe_dir
        .ancestors()
        .map(|dir| dir.join(FRONTEND_DIR_NAME))
        .find(|candidate| candidate.is_dir())
        .unwrap_or_else(|| {
            exe_dir
                .parent()
                .unwrap_or(exe_dir)
                .join(FRONTEND_DIR_NAME)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.server.workers, None);
        assert_eq!(cfg.frontend.dir, None);
        assert_eq!(cfg.frontend.index_file, "index.html");
        assert_eq!(cfg.routes.static_prefix, "/static");
        assert_eq!(cfg.routes.health_path, "/health");
        assert_eq!(cfg.http.server_name, "frontend_server");
        assert!(cfg.logging.access_log);
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert_eq!(cfg.performance.max_connections, None);
        assert_eq!(cfg.socket_addr().unwrap().port(), 8000);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [server]
            port = 9090
            workers = 2

            [frontend]
            dir = "/srv/app/frontend"

            [logging]
            level = "debug"
            access_log_format = "json"

            [performance]
            max_connections = 64
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.workers, Some(2));
        assert_eq!(cfg.frontend.dir.as_deref(), Some("/srv/app/frontend"));
        assert_eq!(cfg.frontend.index_file, "index.html");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.access_log_format, "json");
        assert_eq!(cfg.performance.max_connections, Some(64));
        assert_eq!(cfg.performance.read_timeout, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "[server]\nhost = \"0.0.0.0\"\nport = 8123\n").unwrap();

        let cfg = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8123);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent");
        let cfg = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.routes.static_prefix, "/static");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "[routes]\nstatic_prefix = \"static\"",
            "[routes]\nstatic_prefix = \"/\"",
            "[routes]\nstatic_prefix = \"/static/\"",
            "[routes]\nhealth_path = \"health\"",
            "[routes]\nhealth_path = \"/\"",
            "[routes]\nhealth_path = \"/static\"",
            "[routes]\nhealth_path = \"/static/health\"",
            "[routes]\nstatic_prefix = \"/assets\"\nhealth_path = \"/assets/ok\"",
            "[frontend]\nindex_file = \"../secret.html\"",
            "[logging]\nlevel = \"loud\"",
            "[performance]\nread_timeout = 0",
            "[server]\nhost = \"\"",
        ];
        for toml in cases {
            assert!(
                matches!(Config::from_toml_str(toml), Err(ConfigError::Invalid(_))),
                "expected rejection for {toml:?}"
            );
        }
    }

    #[test]
    fn test_health_path_beside_static_prefix() {
        let cfg = Config::from_toml_str("[routes]\nhealth_path = \"/staticz\"").unwrap();
        assert_eq!(cfg.routes.health_path, "/staticz");
    }

    #[test]
    fn test_invalid_socket_addr() {
        let cfg = Config::from_toml_str("[server]\nhost = \"not a host\"").unwrap();
        assert!(matches!(
            cfg.socket_addr(),
            Err(ConfigError::Address { .. })
        ));
    }

    #[test]
    fn test_resolve_configured_dir_wins() {
        let dir = resolve_frontend_dir(Some("/opt/site"), Path::new("/usr/bin/server"));
        assert_eq!(dir, PathBuf::from("/opt/site"));
    }

    #[test]
    fn test_resolve_sibling_of_install_dir() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("bin")).unwrap();
        fs::create_dir_all(root.path().join("frontend")).unwrap();

        let exe = root.path().join("bin").join("frontend_server");
        assert_eq!(
            resolve_frontend_dir(None, &exe),
            root.path().join("frontend")
        );
    }

    #[test]
    fn test_resolve_prefers_nearest_ancestor() {
        let root = TempDir::new().unwrap();
        let debug = root.path().join("target").join("debug");
        fs::create_dir_all(&debug).unwrap();
        fs::create_dir_all(root.path().join("frontend")).unwrap();
        fs::create_dir_all(debug.join("frontend")).unwrap();

        let exe = debug.join("frontend_server");
        assert_eq!(resolve_frontend_dir(None, &exe), debug.join("frontend"));
    }

    #[test]
    fn test_resolve_falls_back_to_sibling() {
        let root = TempDir::new().unwrap();
        let bin = root.path().join("opt").join("bin");
        fs::create_dir_all(&bin).unwrap();

        let exe = bin.join("frontend_server");
        let resolved = resolve_frontend_dir(None, &exe);
        // Only valid when no ancestor of the temp dir has a frontend folder
        if !root
            .path()
            .ancestors()
            .any(|dir| dir.join(FRONTEND_DIR_NAME).is_dir())
        {
            assert_eq!(resolved, root.path().join("opt").join("frontend"));
        }
    }
}
