//! Idempotency detection.
//!
//! A task is recognised as applied by marker substrings: one per op (explicit
//! or derived from the op's text) plus the optional task-level marker.

use crate::task::Task;

/// Whether a task's edits are present in a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    NotApplied,
    Applied,
    /// Some markers found, others not. Never repaired automatically.
    Partial {
        present: Vec<String>,
        missing: Vec<String>,
    },
}

/// Markers for `task`, task-level marker first, duplicates removed.
pub fn markers(task: &Task) -> Vec<String> {
    let mut markers: Vec<String> = Vec::new();
    let candidates = task
        .marker
        .iter()
        .cloned()
        .chain(task.ops.iter().filter_map(|op| op.marker()));

    for marker in candidates {
        if !marker.is_empty() && !markers.contains(&marker) {
            markers.push(marker);
        }
    }
    markers
}

/// Classify `buffer` for `task`.
///
/// A task without any marker is always [`GuardState::NotApplied`]. The
/// orchestrator refuses to run such tasks, since a second run would edit
/// again.
pub fn check(buffer: &str, task: &Task) -> GuardState {
    let (present, missing): (Vec<String>, Vec<String>) = markers(task)
        .into_iter()
        .partition(|marker| buffer.contains(marker.as_str()));

    match (present.is_empty(), missing.is_empty()) {
        (true, _) => GuardState::NotApplied,
        (false, true) => GuardState::Applied,
        (false, false) => GuardState::Partial { present, missing },
    }
}

pub fn already_applied(buffer: &str, task: &Task) -> bool {
    check(buffer, task) == GuardState::Applied
}
