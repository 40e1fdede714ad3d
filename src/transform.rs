//! Turning a located anchor plus an edit description into a new buffer.
//!
//! Every operation is planned as a single [`Splice`] against the current
//! buffer, then applied. Planning never mutates; a failed plan leaves the
//! caller's buffer exactly as it was.

use crate::anchor::{self, AnchorError, AnchorMatch, AnchorSpec};
use crate::edit::{Splice, SpliceError};
use crate::scope::{Delimiter, ScopeError, ScopeScanner};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Default indentation unit when a block body gives no example.
const DEFAULT_INDENT_UNIT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditKind {
    /// Insert lines after the line holding the anchor's end.
    InsertAfter,
    /// Insert lines before the line holding the anchor's start.
    InsertBefore,
    /// Replace the matched span.
    ReplaceSpan,
    /// Replace a delimited block, opener through closer.
    ReplaceScope,
    /// Insert lines after the line holding a block's closer.
    InsertAfterScope,
    /// Insert lines as the last lines inside a block.
    InsertBeforeScopeEnd,
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditKind::InsertAfter => "insert-after",
            EditKind::InsertBefore => "insert-before",
            EditKind::ReplaceSpan => "replace-span",
            EditKind::ReplaceScope => "replace-scope",
            EditKind::InsertAfterScope => "insert-after-scope",
            EditKind::InsertBeforeScopeEnd => "insert-before-scope-end",
        };
        f.write_str(name)
    }
}

/// How inserted lines are indented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndentMode {
    /// Dedent the text, then indent it to match the anchor line.
    #[default]
    Anchor,
    /// Insert the text as written.
    Verbatim,
}

/// One edit: an anchor, a kind, and the text to place.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditOp {
    #[serde(rename = "type")]
    pub kind: EditKind,
    pub anchor: AnchorSpec,
    #[serde(default)]
    pub text: String,
    /// Substring whose presence shows this op was already applied.
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub indent: IndentMode,
    /// Delimiter used by scope-relative kinds.
    #[serde(default)]
    pub delimiter: Delimiter,
}

impl EditOp {
    pub fn new(kind: EditKind, anchor: impl Into<AnchorSpec>, text: impl Into<String>) -> Self {
        Self {
            kind,
            anchor: anchor.into(),
            text: text.into(),
            marker: None,
            indent: IndentMode::Anchor,
            delimiter: Delimiter::Brace,
        }
    }

    pub fn insert_after(anchor: impl Into<AnchorSpec>, text: impl Into<String>) -> Self {
        Self::new(EditKind::InsertAfter, anchor, text)
    }

    pub fn insert_before(anchor: impl Into<AnchorSpec>, text: impl Into<String>) -> Self {
        Self::new(EditKind::InsertBefore, anchor, text)
    }

    pub fn replace_span(anchor: impl Into<AnchorSpec>, text: impl Into<String>) -> Self {
        Self::new(EditKind::ReplaceSpan, anchor, text)
    }

    pub fn replace_scope(anchor: impl Into<AnchorSpec>, text: impl Into<String>) -> Self {
        Self::new(EditKind::ReplaceScope, anchor, text)
    }

    pub fn insert_after_scope(anchor: impl Into<AnchorSpec>, text: impl Into<String>) -> Self {
        Self::new(EditKind::InsertAfterScope, anchor, text)
    }

    pub fn insert_before_scope_end(anchor: impl Into<AnchorSpec>, text: impl Into<String>) -> Self {
        Self::new(EditKind::InsertBeforeScopeEnd, anchor, text)
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn verbatim(mut self) -> Self {
        self.indent = IndentMode::Verbatim;
        self
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Marker for the idempotency guard.
    ///
    /// The explicit marker when set, otherwise the longest non-blank line of
    /// the text (trimmed). `None` when the text is blank.
    pub fn marker(&self) -> Option<String> {
        if let Some(marker) = &self.marker {
            return Some(marker.clone());
        }

        let mut longest: Option<&str> = None;
        for line in self.text.lines().map(str::trim) {
            if !line.is_empty() && longest.map_or(true, |l| line.len() > l.len()) {
                longest = Some(line);
            }
        }
        longest.map(str::to_string)
    }

    pub fn is_insertion(&self) -> bool {
        !matches!(self.kind, EditKind::ReplaceSpan | EditKind::ReplaceScope)
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.anchor)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Splice(#[from] SpliceError),
}

/// Apply one op to `buffer`, returning the new buffer.
pub fn apply(buffer: &str, op: &EditOp) -> Result<String, TransformError> {
    let splice = plan(buffer, op)?;
    Ok(splice.apply_to(buffer)?)
}

/// Compute the splice for `op` without applying it.
pub fn plan(buffer: &str, op: &EditOp) -> Result<Splice, TransformError> {
    let found = anchor::locate(buffer, &op.anchor, 0)?;
    let anchor_indent = leading_whitespace(line_at(buffer, found.start));

    let splice = match op.kind {
        EditKind::InsertAfter => {
            let block = shape_block(&op.text, anchor_indent, op.indent);
            insert_after_line(buffer, line_end_of_span(buffer, &found), &block)
        }
        EditKind::InsertBefore => {
            let block = shape_block(&op.text, anchor_indent, op.indent);
            Splice::insertion(line_start(buffer, found.start), format!("{block}\n"))
        }
        EditKind::ReplaceSpan => {
            Splice::new(found.start, found.end, op.text.as_str(), found.text(buffer))
        }
        EditKind::ReplaceScope => {
            let (open, close) = scope_bounds(buffer, &found, op.delimiter)?;
            let end = close + op.delimiter.close().len_utf8();
            Splice::new(open, end, op.text.as_str(), &buffer[open..end])
        }
        EditKind::InsertAfterScope => {
            let (_, close) = scope_bounds(buffer, &found, op.delimiter)?;
            let block = shape_block(&op.text, anchor_indent, op.indent);
            insert_after_line(buffer, buffer[close..].find('\n').map(|i| close + i + 1), &block)
        }
        EditKind::InsertBeforeScopeEnd => {
            let (open, close) = scope_bounds(buffer, &found, op.delimiter)?;
            let body_indent = body_indent(buffer, open, close, anchor_indent);
            let block = shape_block(&op.text, &body_indent, op.indent);
            let closer_line = line_start(buffer, close);
            if buffer[closer_line..close].trim().is_empty() {
                Splice::insertion(closer_line, format!("{block}\n"))
            } else {
                Splice::insertion(close, format!("\n{block}\n{anchor_indent}"))
            }
        }
    };

    Ok(splice)
}

/// Opener and matching closer offsets for a scope-relative op.
///
/// Without a structurally verified opener, the block must open on the
/// anchor's own line or as the first thing on the next non-blank line.
fn scope_bounds(
    buffer: &str,
    found: &AnchorMatch,
    delimiter: Delimiter,
) -> Result<(usize, usize), ScopeError> {
    let scanner = ScopeScanner::new(delimiter);
    let open = match found.opener {
        Some(opener) if buffer[opener..].starts_with(delimiter.open()) => opener,
        _ => anchored_opener(buffer, found, &scanner)?,
    };
    let close = scanner.find_scope_end(buffer, open)?;
    Ok((open, close))
}

fn anchored_opener(
    buffer: &str,
    found: &AnchorMatch,
    scanner: &ScopeScanner,
) -> Result<usize, ScopeError> {
    let line_end = buffer[found.end..]
        .find('\n')
        .map_or(buffer.len(), |i| found.end + i);

    scanner
        .find_opener(buffer, found.start, line_end)
        .or_else(|err| {
            let rest = &buffer[line_end..];
            let next = line_end + (rest.len() - rest.trim_start().len());
            if buffer[next..].starts_with(scanner.delimiter().open()) {
                Ok(next)
            } else {
                Err(err)
            }
        })
}

/// Offset just past the newline ending the anchor's last line, if any.
fn line_end_of_span(buffer: &str, found: &AnchorMatch) -> Option<usize> {
    if found.end > found.start && found.text(buffer).ends_with('\n') {
        return Some(found.end);
    }
    buffer[found.end..].find('\n').map(|i| found.end + i + 1)
}

/// Insert `block` as whole lines at `at`; `None` means after a final
/// unterminated line.
fn insert_after_line(buffer: &str, at: Option<usize>, block: &str) -> Splice {
    match at {
        Some(at) => Splice::insertion(at, format!("{block}\n")),
        None => Splice::insertion(buffer.len(), format!("\n{block}")),
    }
}

fn line_start(buffer: &str, pos: usize) -> usize {
    buffer[..pos].rfind('\n').map_or(0, |i| i + 1)
}

fn line_at(buffer: &str, pos: usize) -> &str {
    let start = line_start(buffer, pos);
    let end = buffer[start..].find('\n').map_or(buffer.len(), |i| start + i);
    &buffer[start..end]
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start_matches([' ', '\t']).len()]
}

/// Indentation of the block body: the first non-blank line after the opener's
/// line, or one unit deeper than the anchor.
fn body_indent(buffer: &str, open: usize, close: usize, anchor_indent: &str) -> String {
    let inner = &buffer[open + 1..close];
    inner
        .split('\n')
        .skip(1)
        .find(|line| !line.trim().is_empty())
        .map(leading_whitespace)
        .filter(|indent| indent.len() > anchor_indent.len())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{anchor_indent}{DEFAULT_INDENT_UNIT}"))
}

/// Prepare inserted text: one trailing newline dropped, then re-indented.
fn shape_block(text: &str, indent: &str, mode: IndentMode) -> String {
    let text = text.strip_suffix('\n').unwrap_or(text);
    match mode {
        IndentMode::Verbatim => text.to_string(),
        IndentMode::Anchor => reindent(text, indent),
    }
}

/// Remove the common leading whitespace, then prefix every non-blank line
/// with `indent`. Blank lines stay empty.
pub fn reindent(text: &str, indent: &str) -> String {
    let common = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| leading_whitespace(line).len())
        .min()
        .unwrap_or(0);

    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{indent}{}", &line[common..])
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
