use crate::anchor::{AnchorSpec, Occurrence};
use crate::guard;
use crate::orchestrator::{sanitize_name, OutputMode};
use crate::task::Task;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// A task-set file: metadata plus an ordered task list.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TaskSetConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskSetConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.tasks.is_empty() {
            issues.push(ValidationIssue::EmptyTaskList);
        }

        if let Some(output) = &self.meta.output {
            if output.mode == OutputKind::Diff && output.path.is_none() {
                issues.push(ValidationIssue::InvalidCombo {
                    task: None,
                    message: "output mode 'diff' requires 'path'".to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        let mut patch_names: HashMap<String, &str> = HashMap::new();
        for task in &self.tasks {
            let id = (!task.name.trim().is_empty()).then(|| task.name.clone());

            match &id {
                None => issues.push(ValidationIssue::MissingField {
                    task: None,
                    field: "name",
                }),
                Some(name) => {
                    if !seen.insert(task.name.as_str()) {
                        issues.push(ValidationIssue::DuplicateName { name: name.clone() });
                    } else if let Some(first) =
                        patch_names.insert(sanitize_name(&task.name), task.name.as_str())
                    {
                        issues.push(ValidationIssue::PatchNameCollision {
                            first: first.to_string(),
                            second: name.clone(),
                        });
                    }
                }
            }

            if task.file.as_os_str().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    task: id.clone(),
                    field: "file",
                });
            }

            if task.ops.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    task: id.clone(),
                    field: "ops",
                });
            }

            if !task.ops.is_empty() && guard::markers(task).is_empty() {
                issues.push(ValidationIssue::MissingMarker { task: id.clone() });
            }

            for (idx, op) in task.ops.iter().enumerate() {
                let op_no = idx + 1;
                check_anchor(&op.anchor, &id, op_no, &mut issues);

                if op.is_insertion() && op.text.trim().is_empty() {
                    issues.push(ValidationIssue::InvalidOp {
                        task: id.clone(),
                        op: op_no,
                        message: format!("{} requires non-empty 'text'", op.kind),
                    });
                }

                if op.marker.as_deref().is_some_and(|m| m.is_empty()) {
                    issues.push(ValidationIssue::InvalidOp {
                        task: id.clone(),
                        op: op_no,
                        message: "'marker' must not be empty".to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn check_anchor(
    anchor: &AnchorSpec,
    task: &Option<String>,
    op: usize,
    issues: &mut Vec<ValidationIssue>,
) {
    if anchor.is_empty() {
        issues.push(ValidationIssue::InvalidOp {
            task: task.clone(),
            op,
            message: "anchor needs 'text' or a 'structural' token".to_string(),
        });
    }
    if anchor.occurrence == Some(Occurrence::Nth(0)) {
        issues.push(ValidationIssue::InvalidOp {
            task: task.clone(),
            op,
            message: "occurrence 'nth' is 1-based; 0 never matches".to_string(),
        });
    }
    if let Some(after) = &anchor.after {
        check_anchor(after, task, op, issues);
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver requirement the target version must satisfy.
    #[serde(default)]
    pub version_range: Option<String>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

/// Default output for a task set; command-line flags override it.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    #[serde(default)]
    pub mode: OutputKind,
    /// Patch directory for `diff` mode.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    #[default]
    #[serde(alias = "in-place")]
    Inplace,
    Diff,
    DryRun,
}

impl OutputConfig {
    /// Output mode with a relative patch directory resolved against `base`.
    pub fn resolve(&self, base: &Path) -> OutputMode {
        match self.mode {
            OutputKind::Inplace => OutputMode::InPlace,
            OutputKind::DryRun => OutputMode::DryRun,
            OutputKind::Diff => {
                let dir = self.path.clone().unwrap_or_else(|| PathBuf::from("patches-out"));
                let output_dir = if dir.is_absolute() { dir } else { base.join(dir) };
                OutputMode::Diff { output_dir }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyTaskList,
    MissingField {
        task: Option<String>,
        field: &'static str,
    },
    DuplicateName {
        name: String,
    },
    /// Two task names map to the same `<name>.patch` file.
    PatchNameCollision {
        first: String,
        second: String,
    },
    /// No op text or marker can show that the task was applied.
    MissingMarker {
        task: Option<String>,
    },
    InvalidOp {
        task: Option<String>,
        op: usize,
        message: String,
    },
    InvalidCombo {
        task: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyTaskList => write!(f, "task set contains no tasks"),
            ValidationIssue::MissingField { task, field } => match task {
                Some(name) => write!(f, "task '{name}' missing required field '{field}'"),
                None => write!(f, "task missing required field '{field}'"),
            },
            ValidationIssue::DuplicateName { name } => {
                write!(f, "task name '{name}' is used more than once")
            }
            ValidationIssue::PatchNameCollision { first, second } => write!(
                f,
                "tasks '{first}' and '{second}' would write the same patch file '{}.patch'",
                sanitize_name(second)
            ),
            ValidationIssue::MissingMarker { task } => {
                let hint = "no op leaves text to detect; set a task-level 'marker'";
                match task {
                    Some(name) => write!(f, "task '{name}': {hint}"),
                    None => write!(f, "task: {hint}"),
                }
            }
            ValidationIssue::InvalidOp { task, op, message } => match task {
                Some(name) => write!(f, "task '{name}' op {op}: {message}"),
                None => write!(f, "op {op}: {message}"),
            },
            ValidationIssue::InvalidCombo { task, message } => match task {
                Some(name) => write!(f, "task '{name}' has invalid configuration: {message}"),
                None => write!(f, "invalid task set configuration: {message}"),
            },
        }
    }
}
