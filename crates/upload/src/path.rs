use std::path::{Component, Path};

use crate::UploadError;

/// Checks that an upload path stays inside the store root.
///
/// The path comes straight out of the request URL, so absolute paths,
/// `..` traversal, and platform prefix components are all rejected before
/// it is ever joined to the root.
pub fn validate_store_path(file_path: &str) -> Result<(), UploadError> {
    if file_path.is_empty() {
        return Err(UploadError::InvalidPath("empty path".into()));
    }

    let path = Path::new(file_path);
    if path.is_absolute() {
        return Err(UploadError::InvalidPath(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(UploadError::InvalidPath(format!(
                    "parent traversal not allowed: {file_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(UploadError::InvalidPath(format!(
                    "rooted path not allowed: {file_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested_paths() {
        assert!(validate_store_path("boot.cfg").is_ok());
        assert!(validate_store_path("a/b/c.txt").is_ok());
        assert!(validate_store_path(".hidden/settings").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_store_path("").is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_store_path("..").is_err());
        assert!(validate_store_path("../boot.cfg").is_err());
        assert!(validate_store_path("a/../../escape").is_err());
    }

    #[test]
    fn rejects_absolute() {
        assert!(validate_store_path("/etc/passwd").is_err());
    }
}
