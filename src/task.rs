use crate::transform::EditOp;
use serde::Deserialize;
use std::path::PathBuf;

/// An ordered list of edits against one file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub name: String,
    /// Target path, relative to the workspace root.
    #[serde(default)]
    pub file: PathBuf,
    /// Task-level marker checked in addition to the per-op markers.
    #[serde(default)]
    pub marker: Option<String>,
    /// Reject results that unbalance a previously balanced delimiter pair.
    #[serde(default)]
    pub check_balance: bool,
    #[serde(default)]
    pub ops: Vec<EditOp>,
}

impl Task {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            marker: None,
            check_balance: false,
            ops: Vec::new(),
        }
    }

    pub fn op(mut self, op: EditOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn check_balance(mut self) -> Self {
        self.check_balance = true;
        self
    }
}
