// ABOUTME: Resolution of apply-edits payloads into filesystem-ready batches.
// ABOUTME: Unresolvable targets are skipped with a warning; the batch continues.

use std::path::PathBuf;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::editor::ResolvedFileEdit;
use crate::paths::resolve_uri;
use crate::protocol::FileEdit;

/// Resolve every file entry's URI, dropping the ones that cannot be
/// resolved. A skipped entry gets a warning log; it never fails the batch.
pub fn resolve_batch(
    edits: &[FileEdit],
    roots: &[PathBuf],
    bus: &Arc<EventBus>,
) -> Vec<ResolvedFileEdit> {
    let mut batch = Vec::with_capacity(edits.len());
    for file in edits {
        match resolve_uri(&file.uri, roots) {
            Ok(path) => batch.push(ResolvedFileEdit {
                path,
                edits: file.edits.clone(),
            }),
            Err(e) => {
                tracing::warn!(uri = %file.uri, error = %e, "skipping unresolvable edit target");
                bus.warn(format!("skipping edit for `{}`: {e}", file.uri));
            }
        }
    }
    batch
}

// =============================================================================
// Tests
// =============================================================================
