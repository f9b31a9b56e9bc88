//! Slash-separated tree paths.
//!
//! A valid path:
//! - is non-empty
//! - does not start or end with `/`
//! - has no empty segment (no `//`)
//! - has no NUL byte

use crate::error::{StagingError, StagingResult};

/// Split `path` into its segments, validating the whole path first so that
/// no caller mutates anything on a path that later turns out to be bad.
pub(crate) fn split(path: &str) -> StagingResult<Vec<&str>> {
    let invalid = |reason: &str| StagingError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    };

    if path.is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if path.contains('\0') {
        return Err(invalid("path must not contain NUL"));
    }
    if path.starts_with('/') {
        return Err(invalid("path must not start with '/'"));
    }
    if path.ends_with('/') {
        return Err(invalid("path must not end with '/'"));
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid("path must not contain empty segments"));
    }
    Ok(segments)
}

/// Join a parent path and a child name for error messages and logs.
pub(crate) fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}
