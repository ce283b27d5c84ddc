// ABOUTME: URI resolution for agent-supplied edit targets.
// ABOUTME: Pure function: file: scheme, absolute paths, then workspace-relative fallback.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriResolveError {
    #[error("empty uri")]
    Empty,
    #[error("`{uri}` is relative and no workspace root is configured")]
    NoWorkspaceRoot { uri: String },
}

/// Resolve a raw edit-target string to a filesystem path.
///
/// Precedence: an explicit `file:` scheme is parsed directly; a POSIX
/// absolute path or a Windows drive-letter path is used as-is; anything else
/// resolves relative to the first workspace root. Resolution is pure: no
/// filesystem access, no existence check.
pub fn resolve_uri(raw: &str, roots: &[PathBuf]) -> Result<PathBuf, UriResolveError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UriResolveError::Empty);
    }

    if let Some(rest) = raw.strip_prefix("file://") {
        // file:///C:/dir on Windows keeps a leading slash before the drive
        let path = match rest.as_bytes() {
            [b'/', drive, b':', ..] if drive.is_ascii_alphabetic() => &rest[1..],
            _ => rest,
        };
        return Ok(PathBuf::from(path));
    }

    if raw.starts_with('/') || has_drive_prefix(raw) {
        return Ok(PathBuf::from(raw));
    }

    match roots.first() {
        Some(root) => Ok(root.join(raw)),
        None => Err(UriResolveError::NoWorkspaceRoot {
            uri: raw.to_string(),
        }),
    }
}

fn has_drive_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// First workspace root, if any. Convenience for callers that only need the
/// anchor directory.
pub fn primary_root(roots: &[PathBuf]) -> Option<&Path> {
    roots.first().map(PathBuf::as_path)
}

// =============================================================================
// Tests
// =============================================================================
