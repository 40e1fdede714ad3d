//! Filesystem collaborator: reading task targets and committing results.

use crate::safety::{SafetyError, WorkspaceGuard};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            FsError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            FsError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Read and write whole files by path.
pub trait FileSystem {
    fn read(&self, path: &Path) -> Result<String, FsError>;

    /// Replace the file's content. Implementations must leave the original
    /// untouched when the write fails.
    fn write(&self, path: &Path, content: &str) -> Result<(), FsError>;

    /// How `path` is named in diff headers.
    fn display_path(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

impl<T: FileSystem + ?Sized> FileSystem for &T {
    fn read(&self, path: &Path) -> Result<String, FsError> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), FsError> {
        (**self).write(path, content)
    }

    fn display_path(&self, path: &Path) -> PathBuf {
        (**self).display_path(path)
    }
}

/// The local disk, optionally confined to a workspace.
#[derive(Debug, Clone)]
pub struct LocalFs {
    guard: Option<WorkspaceGuard>,
}

impl LocalFs {
    /// Paths resolve against `workspace_root` and are checked by a
    /// [`WorkspaceGuard`].
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Ok(Self {
            guard: Some(WorkspaceGuard::new(workspace_root)?),
        })
    }

    /// No confinement; relative paths resolve against the current directory.
    pub fn unrestricted() -> Self {
        Self { guard: None }
    }

    pub fn guard(&self) -> Option<&WorkspaceGuard> {
        self.guard.as_ref()
    }

    fn checked_read_path(&self, path: &Path) -> Result<PathBuf, FsError> {
        let Some(guard) = &self.guard else {
            return Ok(path.to_path_buf());
        };
        guard.validate_path(path).map_err(|e| match e {
            SafetyError::Canonicalize(source) => FsError::from_io(&guard.resolve(path), source),
            other => other.into(),
        })
    }

    /// The parent directory is checked so a not-yet-existing file can be
    /// written too.
    fn checked_write_path(&self, path: &Path) -> Result<PathBuf, FsError> {
        let Some(guard) = &self.guard else {
            return Ok(path.to_path_buf());
        };
        let resolved = guard.resolve(path);
        let (Some(parent), Some(name)) = (resolved.parent(), resolved.file_name()) else {
            return Err(FsError::Io {
                path: resolved.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            });
        };
        let parent = guard.validate_path(parent).map_err(|e| match e {
            SafetyError::Canonicalize(source) => FsError::from_io(parent, source),
            other => other.into(),
        })?;
        Ok(parent.join(name))
    }
}

impl FileSystem for LocalFs {
    fn read(&self, path: &Path) -> Result<String, FsError> {
        let path = self.checked_read_path(path)?;
        fs::read_to_string(&path).map_err(|e| FsError::from_io(&path, e))
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), FsError> {
        let path = self.checked_write_path(path)?;
        atomic_write(&path, content.as_bytes()).map_err(|e| FsError::Io {
            path: path.clone(),
            source: e,
        })?;

        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&path, now).map_err(|e| FsError::Io { path, source: e })
    }

    /// Absolute paths inside the workspace are shown relative to its root.
    fn display_path(&self, path: &Path) -> PathBuf {
        let Some(guard) = self.guard.as_ref().filter(|_| path.is_absolute()) else {
            return path.to_path_buf();
        };
        let root = guard.workspace_root();
        if let Ok(relative) = path.strip_prefix(root) {
            return relative.to_path_buf();
        }
        path.canonicalize()
            .ok()
            .and_then(|canonical| canonical.strip_prefix(root).ok().map(Path::to_path_buf))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

/// Atomic file write: tempfile in the same directory, fsync, rename.
///
/// Either the full content lands or the original stays as it was. Existing
/// permissions are carried over to the replacement.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    atomic_write_with(path, content, |_| Ok(()))
}

pub(crate) fn atomic_write_with<F>(path: &Path, content: &[u8], before_persist: F) -> io::Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    before_persist(&mut temp)?;

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-memory filesystem for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RefCell<BTreeMap<PathBuf, String>>,
    writes: Cell<usize>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.borrow_mut().insert(path.into(), content.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }
}

impl FileSystem for MemoryFs {
    fn read(&self, path: &Path) -> Result<String, FsError> {
        self.get(path).ok_or_else(|| FsError::NotFound {
            path: path.to_path_buf(),
        })
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), FsError> {
        self.insert(path, content);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}
