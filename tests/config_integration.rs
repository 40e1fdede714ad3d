//! Integration tests for task-set loading and application
//!
//! Tests validation, output configuration, version gating and full task
//! application against a real directory.

use anchor_patcher::config::{
    apply_tasks, load_from_path, load_from_str, ConfigError, OutputKind, ValidationIssue,
};
use anchor_patcher::{
    ApplicationError, LocalFs, OutputMode, PatchOrchestrator, PatchResult, ResultKind,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a temp dir with test files
fn setup_test_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::write(
        dir.path().join("Config.kt"),
        r#"object Config {
    fun outbounds(): List<String> {
        return listOf("proxy", "direct")
    }

    fun routing(mode: String): Boolean {
        if (mode.isEmpty()) {
            return false
        }
        return true
    }
}
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("tags.xml"),
        "<resources>\n    <item>proxy</item>\n    <item>direct</item>\n</resources>\n",
    )
    .unwrap();

    dir
}

fn orchestrator(root: &Path) -> PatchOrchestrator<LocalFs> {
    PatchOrchestrator::new(LocalFs::new(root).unwrap())
}

#[test]
fn test_load_task_set_basic() {
    let toml = r#"
[meta]
name = "tags"
description = "Outbound tag additions"
version_range = ">=1.8.0"
output = { mode = "diff", path = "out" }

[[tasks]]
name = "add-block"
file = "tags.xml"
marker = "<item>block</item>"

[[tasks.ops]]
type = "insert-after"
anchor = { text = "<item>direct</item>", flexible = false }
text = "<item>block</item>"
"#;

    let config = load_from_str(toml).unwrap();
    assert_eq!(config.meta.name, "tags");
    assert_eq!(config.meta.version_range.as_deref(), Some(">=1.8.0"));
    assert_eq!(config.tasks.len(), 1);
    assert_eq!(config.tasks[0].marker.as_deref(), Some("<item>block</item>"));
    assert!(!config.tasks[0].ops[0].anchor.flexible);

    let output = config.meta.output.as_ref().unwrap();
    assert_eq!(output.mode, OutputKind::Diff);
    assert_eq!(
        output.resolve(Path::new("/ws")),
        OutputMode::Diff {
            output_dir: Path::new("/ws/out").to_path_buf()
        }
    );
}

#[test]
fn test_validation_collects_every_issue() {
    let toml = r#"
[[tasks]]
name = "a"
file = "tags.xml"

[[tasks.ops]]
type = "insert-after"
anchor = { text = "" }
text = "x"

[[tasks]]
name = "a"
file = "tags.xml"

[[tasks.ops]]
type = "insert-before"
anchor = { text = "<item>proxy</item>", occurrence = { nth = 0 } }
text = "   "
"#;

    let Err(ConfigError::Validation { source, .. }) = load_from_str(toml) else {
        panic!("expected validation error");
    };
    assert!(source
        .issues
        .contains(&ValidationIssue::DuplicateName { name: "a".into() }));
    let invalid_ops = source
        .issues
        .iter()
        .filter(|issue| matches!(issue, ValidationIssue::InvalidOp { .. }))
        .count();
    assert_eq!(invalid_ops, 3);
}

#[test]
fn test_unknown_edit_kind_is_a_parse_error() {
    let toml = r#"
[[tasks]]
name = "a"
file = "tags.xml"

[[tasks.ops]]
type = "append-somewhere"
anchor = { text = "x" }
text = "y"
"#;
    assert!(matches!(load_from_str(toml), Err(ConfigError::Toml { .. })));
}

#[test]
fn test_load_from_path_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[[tasks]]\nname = \n").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn test_apply_scope_operations() {
    let workspace = setup_test_workspace();
    let config = load_from_str(
        r#"
[[tasks]]
name = "config-kt"
file = "Config.kt"
check_balance = true

[[tasks.ops]]
type = "replace-scope"
anchor = { structural = { token = "fun outbounds" } }
text = '''{
        return listOf("proxy", "direct", "block")
    }'''

[[tasks.ops]]
type = "insert-after-scope"
anchor = { structural = { token = "fun routing" } }
text = '''

fun isCustom(tag: String) = tag !in outbounds()
'''
"#,
    )
    .unwrap();

    let report = apply_tasks(&config, &mut orchestrator(workspace.path()), None);
    assert!(report.is_success(), "{}", report.tasks[0].message());

    let content = fs::read_to_string(workspace.path().join("Config.kt")).unwrap();
    assert!(content.contains("return listOf(\"proxy\", \"direct\", \"block\")\n    }\n\n    fun routing"));
    assert!(content.ends_with(
        "        return true\n    }\n\n    fun isCustom(tag: String) = tag !in outbounds()\n}\n"
    ));
}

#[test]
fn test_ambiguous_anchor_fails_without_writing() {
    let workspace = setup_test_workspace();
    let config = load_from_str(
        r#"
[[tasks]]
name = "ambiguous"
file = "Config.kt"

[[tasks.ops]]
type = "insert-before"
anchor = { text = "return" }
text = "println()"
"#,
    )
    .unwrap();
    let before = fs::read_to_string(workspace.path().join("Config.kt")).unwrap();

    let report = apply_tasks(&config, &mut orchestrator(workspace.path()), None);
    match &report.tasks[0].result {
        Err(ApplicationError::AmbiguousMatch { op, count, .. }) => {
            assert_eq!(*op, 1);
            assert_eq!(*count, 3);
        }
        other => panic!("expected ambiguity failure, got {other:?}"),
    }
    assert_eq!(
        fs::read_to_string(workspace.path().join("Config.kt")).unwrap(),
        before
    );
}

#[test]
fn test_partial_state_is_reported_not_repaired() {
    let workspace = setup_test_workspace();
    let config = load_from_str(
        r#"
[[tasks]]
name = "tags"
file = "tags.xml"

[[tasks.ops]]
type = "insert-after"
anchor = { text = "<item>direct</item>" }
text = "<item>direct</item>"
marker = "<item>direct</item>"

[[tasks.ops]]
type = "insert-after"
anchor = { text = "<item>proxy</item>" }
text = "<item>custom</item>"
"#,
    )
    .unwrap();

    let report = apply_tasks(&config, &mut orchestrator(workspace.path()), None);
    assert_eq!(report.tasks[0].kind(), ResultKind::PartiallyApplied);
    assert!(!report.is_success());
    match &report.tasks[0].result {
        Ok(PatchResult::PartiallyApplied { present, missing, .. }) => {
            assert_eq!(present, &vec!["<item>direct</item>".to_string()]);
            assert_eq!(missing, &vec!["<item>custom</item>".to_string()]);
        }
        other => panic!("expected partial, got {other:?}"),
    }
}

#[test]
fn test_tasks_on_same_file_see_earlier_results() {
    let workspace = setup_test_workspace();
    let config = load_from_str(
        r#"
[[tasks]]
name = "block"
file = "tags.xml"

[[tasks.ops]]
type = "insert-after"
anchor = { text = "<item>direct</item>" }
text = "<item>block</item>"

[[tasks]]
name = "custom"
file = "tags.xml"

[[tasks.ops]]
type = "insert-after"
anchor = { text = "<item>block</item>" }
text = "<item>custom</item>"
"#,
    )
    .unwrap();

    let mut dry_run = PatchOrchestrator::with_mode(
        LocalFs::new(workspace.path()).unwrap(),
        OutputMode::DryRun,
    );
    let report = apply_tasks(&config, &mut dry_run, None);
    assert!(report.is_success(), "{}", report.tasks[1].message());
    assert_eq!(
        dry_run.staged(Path::new("tags.xml")),
        Some("<resources>\n    <item>proxy</item>\n    <item>direct</item>\n    <item>block</item>\n    <item>custom</item>\n</resources>\n")
    );

    let report = apply_tasks(&config, &mut orchestrator(workspace.path()), Some("1.0.0"));
    assert_eq!(report.summary().applied, 2);
    assert!(fs::read_to_string(workspace.path().join("tags.xml"))
        .unwrap()
        .contains("<item>block</item>\n    <item>custom</item>"));
}

#[test]
fn test_path_escaping_workspace_is_refused() {
    let workspace = setup_test_workspace();
    let outside = TempDir::new().unwrap();
    let target = outside.path().join("victim.txt");
    fs::write(&target, "a,\nb,\n").unwrap();

    let toml = format!(
        r#"
[[tasks]]
name = "escape"
file = "{}"

[[tasks.ops]]
type = "insert-after"
anchor = {{ text = "b," }}
text = "x,"
"#,
        target.display()
    );
    let config = load_from_str(&toml).unwrap();

    let report = apply_tasks(&config, &mut orchestrator(workspace.path()), None);
    assert!(matches!(
        report.tasks[0].result,
        Err(ApplicationError::Safety { .. })
    ));
    assert_eq!(fs::read_to_string(&target).unwrap(), "a,\nb,\n");
}

#[test]
fn test_marked_deletion_runs_once() {
    let workspace = setup_test_workspace();
    let config = load_from_str(
        r#"
[[tasks]]
name = "drop-direct"
file = "tags.xml"
marker = "<item>proxy</item>\n</resources>"

[[tasks.ops]]
type = "replace-span"
anchor = { text = "    <item>direct</item>\n" }
"#,
    )
    .unwrap();

    let first = apply_tasks(&config, &mut orchestrator(workspace.path()), None);
    assert_eq!(first.tasks[0].kind(), ResultKind::Applied, "{}", first.tasks[0].message());
    let after_first = fs::read_to_string(workspace.path().join("tags.xml")).unwrap();
    assert_eq!(after_first, "<resources>\n    <item>proxy</item>\n</resources>\n");

    let second = apply_tasks(&config, &mut orchestrator(workspace.path()), None);
    assert_eq!(second.tasks[0].kind(), ResultKind::AlreadyApplied);
    assert_eq!(
        fs::read_to_string(workspace.path().join("tags.xml")).unwrap(),
        after_first
    );
}
