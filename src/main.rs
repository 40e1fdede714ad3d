use anchor_patcher::config::{apply_tasks, load_from_path, TaskSetConfig};
use anchor_patcher::logging;
use anchor_patcher::{
    ApplicationError, LocalFs, OutputMode, PatchOrchestrator, PatchResult, RunReport, TaskReport,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Environment variable naming the default workspace.
const WORKSPACE_ENV: &str = "ANCHOR_PATCHER_WORKSPACE";

#[derive(Parser)]
#[command(name = "anchor-patcher")]
#[command(about = "Anchored, idempotent text patching", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug-level diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress diagnostics on stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply task sets to a workspace
    Apply {
        /// Path to workspace root (defaults to $ANCHOR_PATCHER_WORKSPACE, then the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific task-set file (otherwise every .toml in patches/)
        #[arg(short, long)]
        tasks: Option<PathBuf>,

        /// Compute results without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Write one .patch file per applied task into DIR instead of editing files
        #[arg(long, value_name = "DIR", conflicts_with = "dry_run")]
        emit_diff: Option<PathBuf>,

        /// Version of the target, checked against each task set's version_range
        #[arg(long)]
        target_version: Option<String>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which tasks are applied, pending, partial or failing
    Status {
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[arg(short, long)]
        tasks: Option<PathBuf>,

        #[arg(long)]
        target_version: Option<String>,
    },

    /// Verify every task is already applied
    Verify {
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[arg(short, long)]
        tasks: Option<PathBuf>,

        #[arg(long)]
        target_version: Option<String>,
    },

    /// List available task sets and their tasks
    List {
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[arg(short, long)]
        tasks: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Apply {
            workspace,
            tasks,
            dry_run,
            diff,
            emit_diff,
            target_version,
            json,
        } => cmd_apply(ApplyArgs {
            workspace,
            tasks,
            dry_run,
            show_diff: diff,
            emit_diff,
            target_version,
            json,
        }),

        Commands::Status {
            workspace,
            tasks,
            target_version,
        } => cmd_status(workspace, tasks, target_version),

        Commands::Verify {
            workspace,
            tasks,
            target_version,
        } => cmd_verify(workspace, tasks, target_version),

        Commands::List { workspace, tasks } => cmd_list(workspace, tasks),
    }
}

/// Discover all .toml task-set files.
///
/// Discovery order:
/// 1. `<workspace>/patches`
/// 2. `./patches` relative to the current working directory
fn discover_task_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let cwd_patches_dir = env::current_dir().ok().map(|cwd| cwd.join("patches"));
    let candidate_dirs = std::iter::once(workspace.join("patches")).chain(cwd_patches_dir);

    for patches_dir in candidate_dirs {
        if !patches_dir.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml task-set files found in either {}/patches or ./patches",
        workspace.display()
    )
}

fn task_files(workspace: &Path, explicit: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    match explicit {
        Some(path) => Ok(vec![path]),
        None => discover_task_files(workspace),
    }
}

/// Resolve the workspace root.
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. ANCHOR_PATCHER_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return Ok(path.canonicalize()?);
    }

    if let Ok(env_path) = env::var(WORKSPACE_ENV) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!("Warning: {WORKSPACE_ENV} is set but path doesn't exist: {env_path}").yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Print a unified diff with +/- lines colored.
fn display_diff(text: &str) {
    println!();
    for line in text.lines() {
        let styled = if line.starts_with("diff --git")
            || line.starts_with("index ")
            || line.starts_with("--- ")
            || line.starts_with("+++ ")
        {
            line.dimmed()
        } else if line.starts_with("@@") {
            line.cyan()
        } else if line.starts_with('+') {
            line.green()
        } else if line.starts_with('-') {
            line.red()
        } else {
            line.normal()
        };
        println!("{styled}");
    }
}

struct ApplyArgs {
    workspace: Option<PathBuf>,
    tasks: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    emit_diff: Option<PathBuf>,
    target_version: Option<String>,
    json: bool,
}

/// Output mode forced by command-line flags, if any.
fn flag_mode(args: &ApplyArgs) -> Option<OutputMode> {
    if args.dry_run {
        Some(OutputMode::DryRun)
    } else {
        args.emit_diff.clone().map(|output_dir| OutputMode::Diff { output_dir })
    }
}

fn config_mode(config: &TaskSetConfig, workspace: &Path) -> OutputMode {
    config
        .meta
        .output
        .as_ref()
        .map(|output| output.resolve(workspace))
        .unwrap_or_default()
}

fn cmd_apply(args: ApplyArgs) -> Result<()> {
    let workspace = resolve_workspace(args.workspace.clone())?;
    let files = task_files(&workspace, args.tasks.clone())?;
    let forced_mode = flag_mode(&args);

    if !args.json {
        println!("Workspace: {}", workspace.display());
        if let Some(version) = &args.target_version {
            println!("Target version: {}", version);
        }
        println!();
    }

    // One orchestrator for the whole run so staged buffers carry across task sets.
    let mut orchestrator = PatchOrchestrator::new(LocalFs::new(&workspace)?);
    let mut report = RunReport::default();

    for task_file in files {
        let config = load_from_path(&task_file)?;
        let mode = forced_mode
            .clone()
            .unwrap_or_else(|| config_mode(&config, &workspace));
        if orchestrator.mode() != &mode {
            orchestrator.set_mode(mode);
        }

        if !args.json {
            println!("Loading tasks from {}...", task_file.display());
            match orchestrator.mode() {
                OutputMode::DryRun => {
                    println!("{}", "  [DRY RUN - showing what would be applied]".cyan())
                }
                OutputMode::Diff { output_dir } => println!(
                    "{}",
                    format!("  [DIFF - writing patches to {}]", output_dir.display()).cyan()
                ),
                OutputMode::InPlace => {}
            }
        }

        let results = apply_tasks(&config, &mut orchestrator, args.target_version.as_deref());

        if !args.json {
            for task in &results.tasks {
                print_apply_result(task, orchestrator.mode(), args.show_diff);
                if let (Ok(PatchResult::Applied { .. }), Some(path)) =
                    (&task.result, orchestrator.patch_path(&task.name))
                {
                    println!("  Patch: {}", path.display());
                }
            }
            println!();
        }

        report.extend(results);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        let summary = report.summary();
        println!("{}", "Summary:".bold());
        println!("  {} applied", format!("{}", summary.applied).green());
        println!(
            "  {} already applied",
            format!("{}", summary.already_applied).yellow()
        );
        println!(
            "  {} partially applied",
            format!("{}", summary.partially_applied).magenta()
        );
        println!("  {} skipped", format!("{}", summary.skipped).cyan());
        println!("  {} failed", format!("{}", summary.failed).red());
    }

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_apply_result(task: &TaskReport, mode: &OutputMode, show_diff: bool) {
    let name = &task.name;
    match &task.result {
        Ok(PatchResult::Applied { file, diff }) => {
            let verb = match mode {
                OutputMode::InPlace => "Applied to",
                OutputMode::Diff { .. } => "Patch generated for",
                OutputMode::DryRun => "Would apply to",
            };
            println!("{} {}: {} {}", "✓".green(), name, verb, file.display());
            if show_diff {
                display_diff(diff.text());
            }
        }
        Ok(PatchResult::AlreadyApplied { file }) => {
            println!(
                "{} {}: Already applied to {}",
                "⊙".yellow(),
                name,
                file.display()
            );
        }
        Ok(PatchResult::PartiallyApplied {
            file,
            present,
            missing,
        }) => {
            eprintln!(
                "{} {}: Partially applied to {}",
                "◐".magenta(),
                name,
                file.display()
            );
            eprintln!("  Present: {}", present.join(", "));
            eprintln!("  Missing: {}", missing.join(", "));
            eprintln!("  Action: resolve by hand; partial states are never repaired automatically");
        }
        Ok(PatchResult::SkippedVersion { reason }) => {
            println!("{} {}: Skipped ({})", "⊘".cyan(), name, reason);
        }
        Err(e) => {
            eprintln!("{} {}: Error - {}", "✗".red(), name, e);

            match e {
                ApplicationError::AnchorNotFound { file, .. } => {
                    eprintln!("  {}", "CONFLICT: Anchor matched no locations".red());
                    eprintln!("  File: {}", file.display());
                    eprintln!("  Possible causes:");
                    eprintln!("    - Anchor text was edited upstream");
                    eprintln!("    - Code was moved to a different file");
                }
                ApplicationError::AmbiguousMatch { file, count, .. } => {
                    eprintln!(
                        "  {}",
                        format!("CONFLICT: Anchor matched {} locations (expected 1)", count).red()
                    );
                    eprintln!("  File: {}", file.display());
                    eprintln!("  Action: add an occurrence selector or an 'after' anchor");
                }
                ApplicationError::Conflict { file } => {
                    eprintln!("  File: {}", file.display());
                    eprintln!("  Action: rerun once other writers are done");
                }
                ApplicationError::Unguarded { .. } => {
                    eprintln!("  Action: add a 'marker' that is present only after the task ran");
                }
                ApplicationError::PatchCollision { .. } => {
                    eprintln!("  Action: rename one of the tasks");
                }
                _ => {}
            }
        }
    }
}

/// Dry-run every task set against the workspace.
fn check_workspace(
    workspace: &Path,
    files: Vec<PathBuf>,
    target_version: Option<&str>,
) -> Result<RunReport> {
    let mut orchestrator =
        PatchOrchestrator::with_mode(LocalFs::new(workspace)?, OutputMode::DryRun);
    let mut report = RunReport::default();
    for task_file in files {
        let config = load_from_path(&task_file)?;
        report.extend(apply_tasks(&config, &mut orchestrator, target_version));
    }
    Ok(report)
}

fn cmd_status(
    workspace: Option<PathBuf>,
    tasks: Option<PathBuf>,
    target_version: Option<String>,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let files = task_files(&workspace, tasks)?;

    println!("{}", "Task Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let report = check_workspace(&workspace, files, target_version.as_deref())?;

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    let mut partial = Vec::new();
    let mut skipped = Vec::new();
    let mut failing = Vec::new();

    for task in &report.tasks {
        match &task.result {
            Ok(PatchResult::AlreadyApplied { .. }) => applied.push((task.name.as_str(), None)),
            Ok(PatchResult::Applied { .. }) => pending.push((task.name.as_str(), None)),
            Ok(PatchResult::PartiallyApplied { missing, .. }) => partial.push((
                task.name.as_str(),
                Some(format!("missing {}", missing.join(", "))),
            )),
            Ok(PatchResult::SkippedVersion { reason }) => {
                skipped.push((task.name.as_str(), Some(reason.clone())))
            }
            Err(e) => failing.push((task.name.as_str(), Some(e.to_string()))),
        }
    }

    print_group("✓".green(), "APPLIED".green().bold(), &applied);
    print_group("⊙".yellow(), "NOT APPLIED".yellow().bold(), &pending);
    print_group("◐".magenta(), "PARTIAL".magenta().bold(), &partial);
    print_group("⊘".cyan(), "SKIPPED".cyan().bold(), &skipped);
    print_group("✗".red(), "FAILING".red().bold(), &failing);

    Ok(())
}

fn print_group(
    icon: colored::ColoredString,
    title: colored::ColoredString,
    entries: &[(&str, Option<String>)],
) {
    if entries.is_empty() {
        return;
    }
    println!("{} {} ({} tasks)", icon, title, entries.len());
    for (name, detail) in entries {
        match detail {
            Some(detail) => println!("  - {} ({})", name, detail.dimmed()),
            None => println!("  - {}", name),
        }
    }
    println!();
}

fn cmd_verify(
    workspace: Option<PathBuf>,
    tasks: Option<PathBuf>,
    target_version: Option<String>,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let files = task_files(&workspace, tasks)?;

    println!("{}", "Verifying tasks...".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let report = check_workspace(&workspace, files, target_version.as_deref())?;

    let mut verified = 0;
    let mut mismatch = 0;
    let mut skipped = 0;

    for task in &report.tasks {
        match &task.result {
            Ok(PatchResult::AlreadyApplied { .. }) => {
                println!("{} {}: Verified (already applied)", "✓".green(), task.name);
                verified += 1;
            }
            Ok(PatchResult::SkippedVersion { reason }) => {
                println!("{} {}: Skipped ({})", "⊘".cyan(), task.name, reason);
                skipped += 1;
            }
            Ok(other) => {
                eprintln!("{} {}: MISMATCH", "✗".red(), task.name);
                eprintln!("  Expected: task already applied");
                eprintln!("  Found: {}", other);
                mismatch += 1;
            }
            Err(e) => {
                eprintln!("{} {}: MISMATCH", "✗".red(), task.name);
                eprintln!("  Error: {}", e);
                mismatch += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", verified).green());
    println!("  {} mismatch", format!("{}", mismatch).red());
    println!("  {} skipped", format!("{}", skipped).cyan());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(workspace: Option<PathBuf>, tasks: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    for task_file in task_files(&workspace, tasks)? {
        let config = load_from_path(&task_file)?;
        let meta = &config.meta;
        let title = if meta.name.is_empty() {
            task_file.display().to_string()
        } else {
            meta.name.clone()
        };

        println!("{} {}", title.bold(), format!("({})", task_file.display()).dimmed());
        if let Some(description) = &meta.description {
            println!("  {}", description);
        }
        if let Some(range) = &meta.version_range {
            println!("  Versions: {}", range.cyan());
        }
        for task in &config.tasks {
            println!(
                "  - {} → {} ({} ops)",
                task.name,
                task.file.display(),
                task.ops.len()
            );
        }
        println!();
    }

    Ok(())
}
