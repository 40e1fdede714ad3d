pub mod applicator;
pub mod loader;
pub mod schema;
pub mod version;

pub use applicator::{apply_tasks, check_tasks};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    Metadata, OutputConfig, OutputKind, TaskSetConfig, ValidationError, ValidationIssue,
};
pub use version::{matches_requirement, VersionError};
