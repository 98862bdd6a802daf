//! Request path resolution module
//!
//! Maps the URL tail of a static request onto a file inside the frontend
//! directory. Resolution is done in two passes: a lexical pass that rejects
//! anything climbing above the root, then a filesystem pass that rejects
//! symlinks pointing outside of it.

use crate::error::ServeError;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Decode `%XX` escapes in a URL path
pub fn percent_decode(raw: &str) -> Result<String, ServeError> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| ServeError::BadRequest(format!("bad escape in '{raw}'")))?;
            decoded.push(hex);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(decoded)
        .map_err(|_| ServeError::BadRequest(format!("'{raw}' is not valid UTF-8")))
}

/// Normalize a decoded relative path without touching the filesystem
///
/// Empty and `.` segments are dropped and `..` pops the previous segment.
/// Popping past the root, NUL bytes, backslashes and segments that are not
/// plain file names (drive prefixes, root components) are rejected.
pub fn sanitize_relative_path(decoded: &str) -> Result<PathBuf, ServeError> {
    if decoded.contains(['\0', '\\']) {
        return Err(ServeError::Forbidden(decoded.to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(ServeError::Forbidden(decoded.to_string()));
                }
            }
            name => {
                let mut components = Path::new(name).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => parts.push(name),
                    _ => return Err(ServeError::Forbidden(decoded.to_string())),
                }
            }
        }
    }

    Ok(parts.iter().collect())
}

/// Resolve `relative` under `root` to the canonical path of a regular file
pub async fn resolve_within(root: &Path, relative: &Path) -> Result<PathBuf, ServeError> {
    let root_canonical = match fs::canonicalize(root).await {
        Ok(p) => p,
        Err(e) => {
            crate::logger::log_debug(&format!(
                "Frontend directory not found or inaccessible '{}': {e}",
                root.display()
            ));
            return Err(ServeError::NotFound);
        }
    };

    // File not found is common (404), no need to log
    let Ok(canonical) = fs::canonicalize(root.join(relative)).await else {
        return Err(ServeError::NotFound);
    };

    if !canonical.starts_with(&root_canonical) {
        return Err(ServeError::Forbidden(format!(
            "{} -> {}",
            relative.display(),
            canonical.display()
        )));
    }

    match fs::metadata(&canonical).await {
        Ok(meta) if meta.is_file() => Ok(canonical),
        _ => Err(ServeError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("app.js").unwrap(), "app.js");
        assert_eq!(percent_decode("my%20file.txt").unwrap(), "my file.txt");
        assert_eq!(percent_decode("%2e%2E%2F").unwrap(), "../");
        assert_eq!(percent_decode("caf%C3%A9.css").unwrap(), "café.css");
    }

    #[test]
    fn test_percent_decode_rejects_malformed() {
        assert!(matches!(percent_decode("%zz"), Err(ServeError::BadRequest(_))));
        assert!(matches!(percent_decode("abc%2"), Err(ServeError::BadRequest(_))));
        assert!(matches!(percent_decode("%ff%fe"), Err(ServeError::BadRequest(_))));
    }

    #[test]
    fn test_sanitize_normal_paths() {
        assert_eq!(
            sanitize_relative_path("js/app.js").unwrap(),
            PathBuf::from("js/app.js")
        );
        assert_eq!(
            sanitize_relative_path("./js//app.js").unwrap(),
            PathBuf::from("js/app.js")
        );
        assert_eq!(
            sanitize_relative_path("js/../app.js").unwrap(),
            PathBuf::from("app.js")
        );
        assert_eq!(sanitize_relative_path("").unwrap(), PathBuf::new());
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        for path in [
            "..",
            "../etc/passwd",
            "../../etc/passwd",
            "js/../../secret",
            "..\\windows",
            "file\0.js",
        ] {
            assert!(
                matches!(sanitize_relative_path(path), Err(ServeError::Forbidden(_))),
                "expected {path:?} to be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_within() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js").join("app.js"), "1").unwrap();

        let resolved = resolve_within(dir.path(), Path::new("js/app.js"))
            .await
            .unwrap();
        assert!(resolved.ends_with("js/app.js"));

        assert!(matches!(
            resolve_within(dir.path(), Path::new("js")).await,
            Err(ServeError::NotFound)
        ));
        assert!(matches!(
            resolve_within(dir.path(), Path::new("missing.js")).await,
            Err(ServeError::NotFound)
        ));
        assert!(matches!(
            resolve_within(&dir.path().join("absent"), Path::new("app.js")).await,
            Err(ServeError::NotFound)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_escape() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("frontend");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "top secret").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("leak.txt"))
            .unwrap();

        assert!(matches!(
            resolve_within(&root, Path::new("leak.txt")).await,
            Err(ServeError::Forbidden(_))
        ));
    }
}
