use crate::TransferError;

/// Validates that a `/`-separated relative path stays inside the
/// destination directory once the server joins it.
///
/// Rejects:
/// - Empty paths and empty segments (`a//b`, trailing `/`)
/// - Absolute paths (leading `/`)
/// - `.` and `..` segments
/// - Backslashes, which a Windows server would treat as separators
/// - NUL bytes
pub fn validate_relative_path(relative_path: &str) -> Result<(), TransferError> {
    if relative_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    if relative_path.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {relative_path}"
        )));
    }

    if relative_path.contains('\\') || relative_path.contains('\0') {
        return Err(TransferError::InvalidPath(format!(
            "illegal character in path: {relative_path:?}"
        )));
    }

    for segment in relative_path.split('/') {
        match segment {
            "" => {
                return Err(TransferError::InvalidPath(format!(
                    "empty path segment: {relative_path}"
                )));
            }
            "." | ".." => {
                return Err(TransferError::InvalidPath(format!(
                    "relative segment not allowed: {relative_path}"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        assert!(validate_relative_path("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_relative_path("../../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_nested_parent_dir_traversal() {
        assert!(validate_relative_path("sub/../../../escape").is_err());
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(validate_relative_path("/tmp/malicious").is_err());
    }

    #[test]
    fn rejects_backslash_separators() {
        let result = validate_relative_path("dir\\..\\evil");
        assert!(matches!(result, Err(TransferError::InvalidPath(_))));
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(validate_relative_path("dir//file.txt").is_err());
        assert!(validate_relative_path("dir/").is_err());
    }

    #[test]
    fn rejects_current_dir_segment() {
        assert!(validate_relative_path("./file.txt").is_err());
    }

    #[test]
    fn accepts_simple_filename() {
        assert!(validate_relative_path("a.txt").is_ok());
    }

    #[test]
    fn accepts_subdirectory_path() {
        assert!(validate_relative_path("dir/sub/c.txt").is_ok());
    }

    #[test]
    fn accepts_dotfile_and_dotted_names() {
        assert!(validate_relative_path(".config/settings.json").is_ok());
        assert!(validate_relative_path("notes..txt").is_ok());
    }
}
