// ABOUTME: Edit-apply seam between the orchestrator and the host's documents.
// ABOUTME: FsEditor applies batches straight to the filesystem, stage-then-write.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::protocol::{Position, TextEdit};

/// All edits for one resolved file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFileEdit {
    pub path: PathBuf,
    pub edits: Vec<TextEdit>,
}

/// Where edit batches land. A host editor implements this against its own
/// document model; the default below writes to the filesystem.
///
/// One call is one atomic batch: `Ok(true)` means the whole batch was
/// accepted, `Ok(false)` means the host rejected it. Errors are treated as
/// rejections by the caller.
#[async_trait]
pub trait WorkspaceEditor: Send + Sync {
    async fn apply(&self, batch: Vec<ResolvedFileEdit>) -> Result<bool>;
}

/// Applies edit batches directly to files on disk.
///
/// Every target file is read and patched in memory before anything is
/// written, so a missing or unreadable file rejects the batch without
/// touching the others.
pub struct FsEditor;

#[async_trait]
impl WorkspaceEditor for FsEditor {
    async fn apply(&self, batch: Vec<ResolvedFileEdit>) -> Result<bool> {
        let mut staged = Vec::with_capacity(batch.len());
        for file in &batch {
            let content = match tokio::fs::read_to_string(&file.path).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %file.path.display(), error = %e, "cannot read edit target");
                    return Ok(false);
                }
            };
            staged.push((file.path.clone(), apply_text_edits(&content, &file.edits)));
        }

        for (path, content) in staged {
            tokio::fs::write(&path, content).await?;
        }
        Ok(true)
    }
}

/// Apply text edits to a document. Edits are applied back-to-front so earlier
/// replacements never shift the offsets of later ones.
pub fn apply_text_edits(content: &str, edits: &[TextEdit]) -> String {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|e| (e.range.start.line, e.range.start.character));

    let mut result = content.to_string();
    for edit in ordered.iter().rev() {
        let start = offset_of(&result, edit.range.start);
        let end = offset_of(&result, edit.range.end).max(start);
        result.replace_range(start..end, &edit.new_text);
    }
    result
}

/// Byte offset of a line/character position, clamped to the document.
/// Characters count Unicode scalar values within the line.
fn offset_of(content: &str, position: Position) -> usize {
    let mut offset = 0;
    let mut line = 0;
    for (index, byte) in content.bytes().enumerate() {
        if line == position.line {
            break;
        }
        if byte == b'\n' {
            line += 1;
            offset = index + 1;
        }
    }
    if line < position.line {
        return content.len();
    }

    let rest = &content[offset..];
    let line_end = rest.find('\n').unwrap_or(rest.len());
    let line_text = &rest[..line_end];
    let within = line_text
        .char_indices()
        .nth(position.character as usize)
        .map(|(i, _)| i)
        .unwrap_or(line_text.len());
    offset + within
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Range;

    fn edit(start: (u32, u32), end: (u32, u32), text: &str) -> TextEdit {
        TextEdit {
            range: Range {
                start: Position {
                    line: start.0,
                    character: start.1,
                },
                end: Position {
                    line: end.0,
                    character: end.1,
                },
            },
            new_text: text.to_string(),
        }
    }

    #[test]
    fn test_single_replacement() {
        let out = apply_text_edits("hello world", &[edit((0, 6), (0, 11), "rust")]);
        assert_eq!(out, "hello rust");
    }

    #[test]
    fn test_multiple_edits_same_line() {
        let out = apply_text_edits(
            "aaa bbb ccc",
            &[edit((0, 0), (0, 3), "xxx"), edit((0, 8), (0, 11), "yyy")],
        );
        assert_eq!(out, "xxx bbb yyy");
    }

    #[test]
    fn test_multiline_replacement() {
        let out = apply_text_edits("one\ntwo\nthree\n", &[edit((1, 0), (2, 5), "2-3")]);
        assert_eq!(out, "one\n2-3\n");
    }

    #[test]
    fn test_insertion_at_position() {
        let out = apply_text_edits("ab\ncd\n", &[edit((1, 1), (1, 1), "X")]);
        assert_eq!(out, "ab\ncXd\n");
    }

    #[test]
    fn test_position_past_end_clamps() {
        let out = apply_text_edits("short", &[edit((5, 0), (9, 9), "tail")]);
        assert_eq!(out, "shorttail");
    }

    #[test]
    fn test_unsorted_edits_apply_correctly() {
        let out = apply_text_edits(
            "aaa bbb ccc",
            &[edit((0, 8), (0, 11), "yyy"), edit((0, 0), (0, 3), "xxx")],
        );
        assert_eq!(out, "xxx bbb yyy");
    }

    #[tokio::test]
    async fn test_fs_editor_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, "hello world").await.unwrap();
        tokio::fs::write(&b, "goodbye").await.unwrap();

        let accepted = FsEditor
            .apply(vec![
                ResolvedFileEdit {
                    path: a.clone(),
                    edits: vec![edit((0, 0), (0, 5), "howdy")],
                },
                ResolvedFileEdit {
                    path: b.clone(),
                    edits: vec![edit((0, 0), (0, 7), "farewell")],
                },
            ])
            .await
            .unwrap();

        assert!(accepted);
        assert_eq!(tokio::fs::read_to_string(&a).await.unwrap(), "howdy world");
        assert_eq!(tokio::fs::read_to_string(&b).await.unwrap(), "farewell");
    }

    #[tokio::test]
    async fn test_fs_editor_rejects_batch_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        tokio::fs::write(&a, "untouched").await.unwrap();

        let accepted = FsEditor
            .apply(vec![
                ResolvedFileEdit {
                    path: dir.path().join("missing.txt"),
                    edits: vec![edit((0, 0), (0, 1), "x")],
                },
                ResolvedFileEdit {
                    path: a.clone(),
                    edits: vec![edit((0, 0), (0, 9), "changed")],
                },
            ])
            .await
            .unwrap();

        assert!(!accepted);
        // The readable file was not modified either; the batch is atomic
        assert_eq!(tokio::fs::read_to_string(&a).await.unwrap(), "untouched");
    }
}
