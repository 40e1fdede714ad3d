//! Unified diff rendering for patched buffers.

use serde::Serialize;
use sha1::{Digest, Sha1};
use similar::{ChangeTag, TextDiff};
use std::path::{Component, Path};

/// Lines of context around each hunk.
pub const CONTEXT_LINES: usize = 3;

/// Abbreviated object id length on the `index` line.
const ABBREV: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Equal,
    Insert,
    Delete,
}

/// One line of a diff with its position on either side (0-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineChange {
    pub kind: ChangeKind,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
    pub text: String,
}

/// Immutable result of diffing two versions of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffArtifact {
    path: String,
    changes: Vec<LineChange>,
    text: String,
}

impl DiffArtifact {
    /// Path as it appears in the diff headers.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn changes(&self) -> &[LineChange] {
        &self.changes
    }

    /// Rendered unified diff; empty when nothing changed.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn insertions(&self) -> usize {
        self.count(ChangeKind::Insert)
    }

    pub fn deletions(&self) -> usize {
        self.count(ChangeKind::Delete)
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }
}

/// Diff `before` against `after` for the file at `path`.
///
/// The text carries `diff --git` and `index` headers so the artifact applies
/// with `git apply` (including `--3way`) or `patch -p1` from the workspace
/// root. Absolute paths lose their root and render like relative ones.
pub fn render(before: &str, after: &str, path: &Path) -> DiffArtifact {
    let path = diff_path(path);
    let diff = TextDiff::from_lines(before, after);

    let changes = diff
        .iter_all_changes()
        .map(|change| LineChange {
            kind: match change.tag() {
                ChangeTag::Equal => ChangeKind::Equal,
                ChangeTag::Insert => ChangeKind::Insert,
                ChangeTag::Delete => ChangeKind::Delete,
            },
            old_index: change.old_index(),
            new_index: change.new_index(),
            text: change.value().to_string(),
        })
        .collect();

    let text = if before == after {
        String::new()
    } else {
        let body = diff
            .unified_diff()
            .context_radius(CONTEXT_LINES)
            .header(&format!("a/{path}"), &format!("b/{path}"))
            .to_string();
        let old_id = blob_id(before);
        let new_id = blob_id(after);
        format!(
            "diff --git a/{path} b/{path}\nindex {}..{}\n{body}",
            &old_id[..ABBREV],
            &new_id[..ABBREV]
        )
    };

    DiffArtifact {
        path,
        changes,
        text,
    }
}

/// Git object id of `content` stored as a blob.
pub fn blob_id(content: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Forward-slash path without root, prefix or `.` components.
fn diff_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            Component::ParentDir => Some("..".into()),
            Component::RootDir | Component::Prefix(_) | Component::CurDir => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
