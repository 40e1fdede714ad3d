//! Anchor Patcher: anchored, idempotent text patching
//!
//! Given a file's current text and an ordered list of edits, find each edit's
//! insertion point robustly, apply the change exactly once, and either write
//! the result in place or emit it as a unified diff.
//!
//! # Architecture
//!
//! All edits compile down to a single primitive: [`Splice`], a verified
//! byte-span replacement on an in-memory buffer. Intelligence lives in span
//! acquisition: [`anchor`] finds positions through an exact, then
//! whitespace-flexible, then structural fallback chain, and [`scope`] finds
//! block boundaries by delimiter depth, skipping strings and comments.
//!
//! # Safety
//!
//! - Ambiguous anchors are refused, never guessed
//! - Unbalanced scopes fail instead of clamping
//! - Tasks already applied are detected by marker and left alone
//! - Atomic file writes (tempfile + fsync + rename)
//! - Workspace boundary enforcement
//!
//! # Example
//!
//! ```
//! use anchor_patcher::{EditOp, MemoryFs, PatchOrchestrator, PatchResult, Task};
//!
//! let fs = MemoryFs::new().with_file("list.txt", "a,\nb,\nc\n");
//! let task = Task::new("add-x", "list.txt").op(EditOp::insert_after("b,", "x,"));
//!
//! let mut orchestrator = PatchOrchestrator::new(&fs);
//! let report = orchestrator.run(&[task.clone()]);
//! assert!(matches!(report.tasks[0].result, Ok(PatchResult::Applied { .. })));
//! assert_eq!(fs.get("list.txt").as_deref(), Some("a,\nb,\nx,\nc\n"));
//!
//! // A second run is a detected no-op.
//! let report = orchestrator.run(&[task]);
//! assert!(matches!(report.tasks[0].result, Ok(PatchResult::AlreadyApplied { .. })));
//! ```

pub mod anchor;
pub mod cache;
pub mod config;
pub mod diff;
pub mod edit;
pub mod fs;
pub mod guard;
pub mod logging;
pub mod orchestrator;
pub mod safety;
pub mod scope;
pub mod task;
pub mod transform;
pub mod validate;

// Re-exports
pub use anchor::{locate, AnchorError, AnchorMatch, AnchorSpec, Occurrence, Strategy};
pub use config::{
    apply_tasks, check_tasks, load_from_path, load_from_str, matches_requirement, ConfigError,
    TaskSetConfig, VersionError,
};
pub use diff::{render, ChangeKind, DiffArtifact, LineChange};
pub use edit::{EditVerification, Splice, SpliceError};
pub use fs::{FileSystem, FsError, LocalFs, MemoryFs};
pub use guard::GuardState;
pub use orchestrator::{
    ApplicationError, OutputMode, PatchOrchestrator, PatchResult, ResultKind, RunReport,
    Summary, TaskReport,
};
pub use safety::{SafetyError, WorkspaceGuard};
pub use scope::{Delimiter, ScopeError, ScopeScanner};
pub use task::Task;
pub use transform::{EditKind, EditOp, IndentMode, TransformError};
pub use validate::BalanceError;
