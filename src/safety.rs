use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories beneath the workspace root that tasks may never touch.
pub const FORBIDDEN_DIRS: &[&str] = &[".git", "build", ".gradle"];

/// Keeps task paths inside the workspace and out of VCS and build output.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical workspace root
    workspace_root: PathBuf,
    /// Forbidden directories, rooted at the canonical workspace root
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    /// Create a guard for `workspace_root`, which must exist.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;
        let forbidden_paths = FORBIDDEN_DIRS
            .iter()
            .map(|dir| workspace_root.join(dir))
            .collect();

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Resolve `path` against the workspace and check it.
    ///
    /// Returns the canonical absolute path. The file must exist.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let canonical = self.resolve(path.as_ref()).canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Absolute form of `path` without touching the filesystem.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        if let Some(forbidden) = self
            .forbidden_paths
            .iter()
            .find(|forbidden| canonical.starts_with(forbidden))
        {
            return Err(SafetyError::ForbiddenPath {
                path: canonical.to_path_buf(),
                forbidden: forbidden.clone(),
            });
        }

        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Replace the forbidden list.
    pub fn with_forbidden(mut self, forbidden: impl IntoIterator<Item = PathBuf>) -> Self {
        self.forbidden_paths = forbidden
            .into_iter()
            .map(|dir| self.resolve(&dir))
            .collect();
        self
    }
}
