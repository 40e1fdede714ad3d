//! Task-set application with version gating.
//!
//! A task set runs only when the target version satisfies its
//! `version_range`; otherwise every task is reported as skipped. Without a
//! target version the range is not consulted.

use crate::config::schema::TaskSetConfig;
use crate::config::version::matches_requirement;
use crate::fs::FileSystem;
use crate::orchestrator::{
    ApplicationError, OutputMode, PatchOrchestrator, PatchResult, RunReport, TaskReport,
};
use tracing::info;

/// Run every task of `config` through `orchestrator`, in order.
pub fn apply_tasks<F: FileSystem>(
    config: &TaskSetConfig,
    orchestrator: &mut PatchOrchestrator<F>,
    target_version: Option<&str>,
) -> RunReport {
    let Some(version) = target_version else {
        return orchestrator.run(&config.tasks);
    };

    match matches_requirement(version, config.meta.version_range.as_deref()) {
        Ok(true) => orchestrator.run(&config.tasks),
        Ok(false) => {
            let req = config.meta.version_range.as_deref().unwrap_or("").trim();
            let reason = format!("target version {version} does not satisfy version_range {req}");
            info!(task_set = %config.meta.name, %reason, "task set skipped");
            report_all(config, |_| {
                Ok(PatchResult::SkippedVersion {
                    reason: reason.clone(),
                })
            })
        }
        Err(e) => report_all(config, |_| Err(ApplicationError::Version(e.clone()))),
    }
}

/// Evaluate `config` without writing anything.
///
/// `Applied` in the result means "would apply".
pub fn check_tasks<F: FileSystem>(
    config: &TaskSetConfig,
    fs: F,
    target_version: Option<&str>,
) -> RunReport {
    let mut orchestrator = PatchOrchestrator::with_mode(fs, OutputMode::DryRun);
    apply_tasks(config, &mut orchestrator, target_version)
}

fn report_all<R>(config: &TaskSetConfig, mut result: R) -> RunReport
where
    R: FnMut(&str) -> Result<PatchResult, ApplicationError>,
{
    RunReport {
        tasks: config
            .tasks
            .iter()
            .map(|task| TaskReport {
                name: task.name.clone(),
                file: task.file.clone(),
                result: result(&task.name),
            })
            .collect(),
    }
}
