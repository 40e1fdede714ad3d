//! Running ordered task lists and collecting per-task outcomes.
//!
//! Each task is processed on its own buffer: read, guard check, ops folded
//! in order, optional balance validation, then output according to the
//! [`OutputMode`]. A failing task never touches its file and never stops the
//! tasks after it.

use crate::anchor::AnchorError;
use crate::config::version::VersionError;
use crate::diff::{self, DiffArtifact};
use crate::edit::{EditVerification, SpliceError};
use crate::fs::{atomic_write, FileSystem, FsError};
use crate::guard::{self, GuardState};
use crate::safety::SafetyError;
use crate::scope::ScopeError;
use crate::task::Task;
use crate::transform::{self, TransformError};
use crate::validate::{self, BalanceError};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where transformed buffers go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Overwrite each target file atomically.
    #[default]
    InPlace,
    /// Write one `<task-name>.patch` per applied task into `output_dir`.
    Diff { output_dir: PathBuf },
    /// Compute everything, write nothing.
    DryRun,
}

impl OutputMode {
    fn stages_buffers(&self) -> bool {
        !matches!(self, OutputMode::InPlace)
    }
}

/// Result of running a single task
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Ops ran and the result was written, emitted or staged
    Applied { file: PathBuf, diff: DiffArtifact },
    /// Every marker was already present, or the ops changed nothing
    AlreadyApplied { file: PathBuf },
    /// Some markers present, some missing; left for a human to resolve
    PartiallyApplied {
        file: PathBuf,
        present: Vec<String>,
        missing: Vec<String>,
    },
    /// Task set does not target this version
    SkippedVersion { reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { file, diff } => write!(
                f,
                "Applied to {} (+{} -{})",
                file.display(),
                diff.insertions(),
                diff.deletions()
            ),
            PatchResult::AlreadyApplied { file } => {
                write!(f, "Already applied to {}", file.display())
            }
            PatchResult::PartiallyApplied { file, missing, .. } => write!(
                f,
                "Partially applied to {}: missing {}",
                file.display(),
                missing.join(", ")
            ),
            PatchResult::SkippedVersion { reason } => {
                write!(f, "Skipped (version): {}", reason)
            }
        }
    }
}

/// Errors that fail a single task.
///
/// `op` fields are 1-based positions in the task's op list.
#[derive(Debug)]
pub enum ApplicationError {
    FileNotFound {
        file: PathBuf,
    },
    AnchorNotFound {
        file: PathBuf,
        op: usize,
        source: AnchorError,
    },
    AmbiguousMatch {
        file: PathBuf,
        op: usize,
        anchor: String,
        count: usize,
    },
    Unbalanced {
        file: PathBuf,
        op: usize,
        source: ScopeError,
    },
    InvalidEdit {
        file: PathBuf,
        op: usize,
        source: SpliceError,
    },
    BalanceViolation {
        file: PathBuf,
        source: BalanceError,
    },
    Io {
        file: PathBuf,
        source: std::io::Error,
    },
    /// The file changed on disk between read and write.
    Conflict {
        file: PathBuf,
    },
    Safety {
        file: PathBuf,
        source: SafetyError,
    },
    /// No marker can tell whether the task already ran.
    Unguarded {
        file: PathBuf,
    },
    /// Another task in this run already wrote `patch`.
    PatchCollision {
        patch: PathBuf,
        first: String,
    },
    Version(VersionError),
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::FileNotFound { file } => {
                write!(f, "file not found: {}", file.display())
            }
            ApplicationError::AnchorNotFound { file, op, source } => {
                write!(f, "op {} in {}: {}", op, file.display(), source)
            }
            ApplicationError::AmbiguousMatch {
                file,
                op,
                anchor,
                count,
            } => write!(
                f,
                "op {} in {}: anchor {} matched {} locations, expected 1",
                op,
                file.display(),
                anchor,
                count
            ),
            ApplicationError::Unbalanced { file, op, source } => {
                write!(f, "op {} in {}: {}", op, file.display(), source)
            }
            ApplicationError::InvalidEdit { file, op, source } => {
                write!(f, "op {} in {}: {}", op, file.display(), source)
            }
            ApplicationError::BalanceViolation { file, source } => {
                write!(f, "{}: {}", file.display(), source)
            }
            ApplicationError::Io { file, source } => {
                write!(f, "I/O error on {}: {}", file.display(), source)
            }
            ApplicationError::Conflict { file } => write!(
                f,
                "{} changed on disk while being patched; rerun to retry",
                file.display()
            ),
            ApplicationError::Safety { file, source } => {
                write!(f, "refusing to touch {}: {}", file.display(), source)
            }
            ApplicationError::Unguarded { file } => write!(
                f,
                "{}: task has no marker to detect a previous run; set a task-level 'marker'",
                file.display()
            ),
            ApplicationError::PatchCollision { patch, first } => write!(
                f,
                "{} was already written by task '{}'",
                patch.display(),
                first
            ),
            ApplicationError::Version(e) => write!(f, "version error: {}", e),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::AnchorNotFound { source, .. } => Some(source),
            ApplicationError::Unbalanced { source, .. } => Some(source),
            ApplicationError::InvalidEdit { source, .. } => Some(source),
            ApplicationError::BalanceViolation { source, .. } => Some(source),
            ApplicationError::Io { source, .. } => Some(source),
            ApplicationError::Safety { source, .. } => Some(source),
            ApplicationError::Version(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VersionError> for ApplicationError {
    fn from(e: VersionError) -> Self {
        ApplicationError::Version(e)
    }
}

impl ApplicationError {
    fn from_fs(file: &Path, error: FsError) -> Self {
        let file = file.to_path_buf();
        match error {
            FsError::NotFound { .. } => ApplicationError::FileNotFound { file },
            FsError::Safety(source) => ApplicationError::Safety { file, source },
            FsError::Io { source, .. } => ApplicationError::Io { file, source },
        }
    }

    fn from_transform(file: &Path, op: usize, error: TransformError) -> Self {
        let file = file.to_path_buf();
        match error {
            TransformError::Anchor(AnchorError::AmbiguousMatch { anchor, count }) => {
                ApplicationError::AmbiguousMatch {
                    file,
                    op,
                    anchor,
                    count,
                }
            }
            TransformError::Anchor(source) => ApplicationError::AnchorNotFound { file, op, source },
            TransformError::Scope(source) => ApplicationError::Unbalanced { file, op, source },
            TransformError::Splice(source) => ApplicationError::InvalidEdit { file, op, source },
        }
    }
}

/// Coarse outcome used for summaries and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Applied,
    AlreadyApplied,
    PartiallyApplied,
    Skipped,
    Failed,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::Applied => "applied",
            ResultKind::AlreadyApplied => "already-applied",
            ResultKind::PartiallyApplied => "partially-applied",
            ResultKind::Skipped => "skipped",
            ResultKind::Failed => "failed",
        }
    }

    /// Whether this outcome lets the run succeed.
    pub fn is_success(self) -> bool {
        !matches!(self, ResultKind::PartiallyApplied | ResultKind::Failed)
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one task.
#[derive(Debug)]
pub struct TaskReport {
    pub name: String,
    pub file: PathBuf,
    pub result: Result<PatchResult, ApplicationError>,
}

impl TaskReport {
    pub fn kind(&self) -> ResultKind {
        match &self.result {
            Ok(PatchResult::Applied { .. }) => ResultKind::Applied,
            Ok(PatchResult::AlreadyApplied { .. }) => ResultKind::AlreadyApplied,
            Ok(PatchResult::PartiallyApplied { .. }) => ResultKind::PartiallyApplied,
            Ok(PatchResult::SkippedVersion { .. }) => ResultKind::Skipped,
            Err(_) => ResultKind::Failed,
        }
    }

    pub fn message(&self) -> String {
        match &self.result {
            Ok(result) => result.to_string(),
            Err(e) => e.to_string(),
        }
    }
}

/// Counts per result kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub applied: usize,
    pub already_applied: usize,
    pub partially_applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.applied + self.already_applied + self.partially_applied + self.skipped + self.failed
    }
}

/// Ordered task reports for one run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for report in &self.tasks {
            match report.kind() {
                ResultKind::Applied => summary.applied += 1,
                ResultKind::AlreadyApplied => summary.already_applied += 1,
                ResultKind::PartiallyApplied => summary.partially_applied += 1,
                ResultKind::Skipped => summary.skipped += 1,
                ResultKind::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|report| report.kind().is_success())
    }

    pub fn extend(&mut self, other: RunReport) {
        self.tasks.extend(other.tasks);
    }

    /// Machine-readable form of the report.
    pub fn to_json(&self) -> serde_json::Value {
        let summary = self.summary();
        let tasks: Vec<_> = self
            .tasks
            .iter()
            .map(|report| {
                let diff = match &report.result {
                    Ok(PatchResult::Applied { diff, .. }) => Some(diff.text()),
                    _ => None,
                };
                json!({
                    "name": report.name,
                    "file": report.file.display().to_string(),
                    "result": report.kind().as_str(),
                    "message": report.message(),
                    "diff": diff,
                })
            })
            .collect();

        json!({
            "success": self.is_success(),
            "summary": {
                "applied": summary.applied,
                "already_applied": summary.already_applied,
                "partially_applied": summary.partially_applied,
                "skipped": summary.skipped,
                "failed": summary.failed,
            },
            "tasks": tasks,
        })
    }
}

/// Runs tasks strictly in order against a [`FileSystem`].
#[derive(Debug)]
pub struct PatchOrchestrator<F: FileSystem> {
    fs: F,
    mode: OutputMode,
    /// Results of earlier tasks when the mode does not write in place.
    staged: HashMap<PathBuf, String>,
    /// Patch files written in diff mode, by the task that wrote them.
    emitted: HashMap<PathBuf, String>,
}

impl<F: FileSystem> PatchOrchestrator<F> {
    pub fn new(fs: F) -> Self {
        Self::with_mode(fs, OutputMode::InPlace)
    }

    pub fn with_mode(fs: F, mode: OutputMode) -> Self {
        Self {
            fs,
            mode,
            staged: HashMap::new(),
            emitted: HashMap::new(),
        }
    }

    pub fn mode(&self) -> &OutputMode {
        &self.mode
    }

    /// Switch modes. Staged buffers from the previous mode are dropped.
    pub fn set_mode(&mut self, mode: OutputMode) {
        self.mode = mode;
        self.staged.clear();
        self.emitted.clear();
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Current content of `file` as later tasks will see it.
    pub fn staged(&self, file: &Path) -> Option<&str> {
        self.staged.get(file).map(String::as_str)
    }

    /// Where the patch for `task_name` goes in [`OutputMode::Diff`].
    pub fn patch_path(&self, task_name: &str) -> Option<PathBuf> {
        match &self.mode {
            OutputMode::Diff { output_dir } => {
                Some(output_dir.join(format!("{}.patch", sanitize_name(task_name))))
            }
            _ => None,
        }
    }

    pub fn run(&mut self, tasks: &[Task]) -> RunReport {
        RunReport {
            tasks: tasks.iter().map(|task| self.run_task(task)).collect(),
        }
    }

    pub fn run_task(&mut self, task: &Task) -> TaskReport {
        let result = self.execute(task);
        match &result {
            Ok(PatchResult::PartiallyApplied { missing, .. }) => {
                warn!(task = %task.name, file = %task.file.display(), ?missing, "task partially applied")
            }
            Ok(outcome) => info!(task = %task.name, "{outcome}"),
            Err(e) => warn!(task = %task.name, error = %e, "task failed"),
        }

        TaskReport {
            name: task.name.clone(),
            file: task.file.clone(),
            result,
        }
    }

    fn execute(&mut self, task: &Task) -> Result<PatchResult, ApplicationError> {
        let file = task.file.clone();
        if guard::markers(task).is_empty() {
            return Err(ApplicationError::Unguarded { file });
        }

        let original = self.read(&file)?;
        let fingerprint = EditVerification::fingerprint(&original);

        match guard::check(&original, task) {
            GuardState::Applied => return Ok(PatchResult::AlreadyApplied { file }),
            GuardState::Partial { present, missing } => {
                return Ok(PatchResult::PartiallyApplied {
                    file,
                    present,
                    missing,
                })
            }
            GuardState::NotApplied => {}
        }

        let mut buffer = original.clone();
        for (idx, op) in task.ops.iter().enumerate() {
            buffer = transform::apply(&buffer, op)
                .map_err(|e| ApplicationError::from_transform(&file, idx + 1, e))?;
            debug!(task = %task.name, op = idx + 1, %op, "op applied");
        }

        if task.check_balance {
            validate::check_all(&original, &buffer).map_err(|source| {
                ApplicationError::BalanceViolation {
                    file: file.clone(),
                    source,
                }
            })?;
        }

        if buffer == original {
            return Ok(PatchResult::AlreadyApplied { file });
        }

        let diff = diff::render(&original, &buffer, &self.fs.display_path(&file));
        self.emit(task, buffer, &fingerprint, &diff)?;
        Ok(PatchResult::Applied { file, diff })
    }

    fn read(&self, file: &Path) -> Result<String, ApplicationError> {
        if let Some(staged) = self.staged.get(file) {
            return Ok(staged.clone());
        }
        self.fs
            .read(file)
            .map_err(|e| ApplicationError::from_fs(file, e))
    }

    fn emit(
        &mut self,
        task: &Task,
        buffer: String,
        fingerprint: &EditVerification,
        diff: &DiffArtifact,
    ) -> Result<(), ApplicationError> {
        let file = &task.file;
        match &self.mode {
            OutputMode::InPlace => {
                let current = self
                    .fs
                    .read(file)
                    .map_err(|e| ApplicationError::from_fs(file, e))?;
                if !fingerprint.matches(&current) {
                    return Err(ApplicationError::Conflict { file: file.clone() });
                }
                self.fs
                    .write(file, &buffer)
                    .map_err(|e| ApplicationError::from_fs(file, e))?;
            }
            OutputMode::Diff { output_dir } => {
                let patch_path = output_dir.join(format!("{}.patch", sanitize_name(&task.name)));
                match self.emitted.get(&patch_path) {
                    Some(first) if *first != task.name => {
                        return Err(ApplicationError::PatchCollision {
                            patch: patch_path,
                            first: first.clone(),
                        });
                    }
                    _ => {}
                }
                fs::create_dir_all(output_dir)
                    .and_then(|()| atomic_write(&patch_path, diff.text().as_bytes()))
                    .map_err(|source| ApplicationError::Io {
                        file: patch_path.clone(),
                        source,
                    })?;
                debug!(task = %task.name, patch = %patch_path.display(), "patch written");
                self.emitted.insert(patch_path, task.name.clone());
            }
            OutputMode::DryRun => {}
        }

        if self.mode.stages_buffers() {
            self.staged.insert(file.clone(), buffer);
        }
        Ok(())
    }
}

/// File-name-safe form of a task name.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
