//! Path validation.
//!
//! Cache paths end up being built from uploaded file names, so nothing that
//! reaches a backend is allowed to climb out of the backend root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalises a storage path.
///
/// `.` components, repeated separators and trailing separators disappear,
/// `..` is resolved lexically and rejected once it would leave the root. The
/// root itself (an empty path) is not a valid file path.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use addons_storage::validate_path;
///
/// assert_eq!(validate_path("100--tux.png").unwrap(), Path::new("100--tux.png"));
/// assert_eq!(validate_path("karts/./tux/../300--tux.png").unwrap(), Path::new("karts/300--tux.png"));
/// assert!(validate_path("../config.php").is_err());
/// assert!(validate_path("tux\0.png").is_err());
/// assert!(validate_path("").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(part) => {
                // Path::components() lets NUL through on Unix, syscalls would
                // silently truncate at it.
                if part.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(part);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_cache_names() {
        assert_eq!(validate("25--kart.png").unwrap(), Path::new("25--kart.png"));
        assert_eq!(validate("cache_graph_downloads.json").unwrap(), Path::new("cache_graph_downloads.json"));
        assert_eq!(validate("images/tracks/snow.jpg").unwrap(), Path::new("images/tracks/snow.jpg"));
    }

    #[test]
    fn test_normalisation() {
        assert_eq!(validate("images//karts///tux.png").unwrap(), Path::new("images/karts/tux.png"));
        assert_eq!(validate("./images/./tux.png").unwrap(), Path::new("images/tux.png"));
        assert_eq!(validate("images/karts/").unwrap(), Path::new("images/karts"));
        // Absolute-looking paths are re-rooted, not rejected.
        assert_eq!(validate("/75--tux.png").unwrap(), Path::new("75--tux.png"));
    }

    #[test]
    fn test_parent_references() {
        assert_eq!(validate("images/old/../tux.png").unwrap(), Path::new("images/tux.png"));
        assert!(validate("../tux.png").is_err());
        assert!(validate("images/../../tux.png").is_err());
        assert!(validate("..").is_err());
    }

    #[test]
    fn test_rejected() {
        assert!(validate("").is_err());
        assert!(validate(".").is_err());
        assert!(validate("//").is_err());
        assert!(validate("images/a/..").is_ok());
        assert!(validate("tux\0.png").is_err());
    }
}
