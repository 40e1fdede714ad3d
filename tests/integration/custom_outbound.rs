//! End-to-end run of `patches/custom-outbound.toml` against a mock Android
//! workspace laid out like an upstream checkout.

use anchor_patcher::config::{apply_tasks, check_tasks, load_from_path};
use anchor_patcher::{LocalFs, OutputMode, PatchOrchestrator, PatchResult, ResultKind, RunReport};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const RULESET_ITEM: &str = "app/src/main/java/com/v2ray/ang/dto/RulesetItem.kt";
const ARRAYS: &str = "app/src/main/res/values/arrays.xml";
const ROUTING_EDIT: &str = "app/src/main/java/com/v2ray/ang/ui/RoutingEditActivity.kt";
const CONFIG_MANAGER: &str = "app/src/main/java/com/v2ray/ang/handler/V2rayConfigManager.kt";

fn task_file() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("patches/custom-outbound.toml")
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

fn setup_mock_workspace() -> TempDir {
    setup_with_ruleset_item(
        r#"package com.v2ray.ang.dto

data class RulesetItem(
    var remarks: String? = "",
    var ip: List<String>? = null,
    var domain: List<String>? = null,
    var outboundTag: String = "",
    var port: String? = null,
    var network: String? = null,
    var protocol: List<String>? = null,
    var enabled: Boolean = true,
    var locked: Boolean? = false,
)
"#,
    )
}

fn setup_with_ruleset_item(ruleset_item: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, RULESET_ITEM, ruleset_item);

    write(
        root,
        ARRAYS,
        r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <string-array name="routing_mode" translatable="false">
        <item>proxy</item>
        <item>block</item>
    </string-array>

    <string-array name="outbound_tag" translatable="false">
        <item>proxy</item>
        <item>direct</item>
        <item>block</item>
    </string-array>
</resources>
"#,
    );

    write(
        root,
        ROUTING_EDIT,
        r#"package com.v2ray.ang.ui

import com.v2ray.ang.extension.nullIfBlank
import com.v2ray.ang.util.Utils

class RoutingEditActivity : BaseActivity() {
    private val position by lazy { intent.getIntExtra("position", -1) }

    private val outbound_tag: Array<out String> by lazy {
        resources.getStringArray(R.array.outbound_tag)
    }

    override fun onCreate(savedInstanceState: Bundle?) {
        super.onCreate(savedInstanceState)
        setContentView(binding.root)

        val rulesetItem = SettingsManager.getRoutingRuleset(position)
        if (rulesetItem != null) {
            bindingServer(rulesetItem)
        } else {
            clearServer()
        }
    }

    private fun bindingServer(rulesetItem: RulesetItem): Boolean {
        binding.etRemarks.text = Utils.getEditable(rulesetItem.remarks)
        val outbound = Utils.arrayFind(outbound_tag, rulesetItem.outboundTag)
        binding.spOutboundTag.setSelection(outbound)
        return true
    }

    private fun clearServer(): Boolean {
        binding.etRemarks.text = null
        binding.spOutboundTag.setSelection(0)
        binding.chkLocked.isChecked = false
        return true
    }

    private fun saveServer(): Boolean {
        val rulesetItem = SettingsManager.getRoutingRuleset(position) ?: RulesetItem()
        rulesetItem.remarks = binding.etRemarks.text.toString()
        rulesetItem.outboundTag = outbound_tag[binding.spOutboundTag.selectedItemPosition]
        SettingsManager.saveRoutingRuleset(position, rulesetItem)
        return true
    }
}
"#,
    );

    write(
        root,
        CONFIG_MANAGER,
        r#"package com.v2ray.ang.handler

object V2rayConfigManager {
    private fun getRouting(v2rayConfig: V2rayConfig): Boolean {
        try {
            val routingMode = MmkvManager.decodeSettingsString(AppConfig.PREF_ROUTING_DOMAIN_STRATEGY)
            v2rayConfig.routing.domainStrategy = routingMode ?: "AsIs"
            return true
        } catch (e: Exception) {
            Log.e(AppConfig.TAG, "Failed to configure routing", e)
            return false
        }
    }

    private fun getUserRule2Domain(tag: String): ArrayList<String> {
        val domain = ArrayList<String>()
        val rulesetItems = MmkvManager.decodeRoutingRulesets()
        rulesetItems?.forEach { key ->
            if (key.enabled && key.outboundTag == tag && !key.domain.isNullOrEmpty())
            {
                key.domain?.forEach {
                    if (it != AppConfig.GEOSITE_PRIVATE) {
                        domain.add(it)
                    }
                }
            }
        }
        return domain
    }

    private fun getOutbounds(v2rayConfig: V2rayConfig): Boolean {
        val outbound = convertProfile2Outbound(profile) ?: return false
        v2rayConfig.outbounds[0] = outbound
        return true
    }
}
"#,
    );

    dir
}

fn run(workspace: &Path, mode: OutputMode) -> RunReport {
    let config = load_from_path(&task_file()).expect("Failed to load custom-outbound.toml");
    let fs = LocalFs::new(workspace).unwrap();
    let mut orchestrator = PatchOrchestrator::with_mode(fs, mode);
    apply_tasks(&config, &mut orchestrator, Some("1.9.16"))
}

fn assert_all(report: &RunReport, expected: ResultKind) {
    for task in &report.tasks {
        assert_eq!(task.kind(), expected, "{}: {}", task.name, task.message());
    }
}

#[test]
fn test_custom_outbound_applies() {
    let workspace = setup_mock_workspace();
    let root = workspace.path();

    let report = run(root, OutputMode::InPlace);
    assert_eq!(report.tasks.len(), 4);
    assert_all(&report, ResultKind::Applied);

    let ruleset = read(root, RULESET_ITEM);
    assert!(ruleset.contains(
        "    var locked: Boolean? = false,\n    var customOutboundTag: String? = null,\n)"
    ));

    let arrays = read(root, ARRAYS);
    assert!(arrays.contains(
        "        <item>block</item>\n        <item>custom</item>\n    </string-array>\n</resources>"
    ));
    assert_eq!(arrays.matches("<item>custom</item>").count(), 1);
    assert!(arrays.contains("<item>proxy</item>\n        <item>block</item>\n    </string-array>\n\n"));

    let activity = read(root, ROUTING_EDIT);
    assert!(activity.contains(
        "import com.v2ray.ang.extension.nullIfBlank\nimport com.v2ray.ang.extension.isNotNullEmpty\n"
    ));
    assert!(activity.contains(
        "        resources.getStringArray(R.array.outbound_tag)\n    }\n    // Index of \"custom\""
    ));
    assert!(activity.contains("    private val CUSTOM_OUTBOUND_INDEX = 3\n\n    override fun onCreate"));
    assert!(activity.contains(
        "            clearServer()\n        }\n\n        // Show the custom outbound input"
    ));
    assert!(activity.contains(
        "            override fun onNothingSelected(parent: android.widget.AdapterView<*>?) {\n            }\n        }\n    }\n\n    private fun bindingServer"
    ));
    assert!(activity.contains(
        "        binding.spOutboundTag.setSelection(outbound)\n        if (rulesetItem.customOutboundTag.isNotNullEmpty()) {\n            binding.etCustomOutboundTag.text = Utils.getEditable(rulesetItem.customOutboundTag)\n        }\n        return true\n"
    ));
    assert!(activity.contains(
        "        binding.chkLocked.isChecked = false\n        binding.etCustomOutboundTag.text = null\n        return true\n"
    ));
    assert!(!activity.contains("outbound_tag[binding.spOutboundTag.selectedItemPosition]"));
    assert!(activity.contains(
        "        val selectedOutboundPosition = binding.spOutboundTag.selectedItemPosition\n        if (selectedOutboundPosition == CUSTOM_OUTBOUND_INDEX) {\n"
    ));

    let manager = read(root, CONFIG_MANAGER);
    assert!(manager.contains(
        "        try {\n            val rulesetItems = MmkvManager.decodeRoutingRulesets()\n            val customOutbounds = mutableSetOf<String>()\n            val routingMode"
    ));
    assert!(manager.contains(
        "            {\n                // Custom outbounds are not standard tags\n                if (isCustomOutboundTag(key.outboundTag)) return@forEach\n                key.domain?.forEach {"
    ));
    assert!(manager.contains(
        "        return domain\n    }\n\n    /**\n     * Whether an outbound tag names"
    ));
    assert!(manager.contains("    private fun isCustomOutboundTag(tag: String): Boolean {\n        return tag"));
    assert!(manager.contains(
        "        return true\n    }\n\n    /**\n     * Adds the profile named by a custom outbound tag"
    ));
    assert!(manager.ends_with("        return true\n    }\n}\n"));
}

#[test]
fn test_custom_outbound_idempotent() {
    let workspace = setup_mock_workspace();
    let root = workspace.path();

    let first = run(root, OutputMode::InPlace);
    assert_all(&first, ResultKind::Applied);
    let snapshot: Vec<String> = [RULESET_ITEM, ARRAYS, ROUTING_EDIT, CONFIG_MANAGER]
        .iter()
        .map(|rel| read(root, rel))
        .collect();

    let second = run(root, OutputMode::InPlace);
    assert_all(&second, ResultKind::AlreadyApplied);
    assert!(second.is_success());

    for (rel, before) in [RULESET_ITEM, ARRAYS, ROUTING_EDIT, CONFIG_MANAGER]
        .iter()
        .zip(&snapshot)
    {
        assert_eq!(&read(root, rel), before, "{rel} changed on re-run");
    }
}

#[test]
fn test_custom_outbound_tolerates_reformatted_anchor() {
    let workspace = setup_with_ruleset_item(
        "data class RulesetItem(\n    var enabled: Boolean = true,\n    var locked:  Boolean? =\tfalse,\n)\n",
    );
    let root = workspace.path();

    let report = run(root, OutputMode::InPlace);
    assert_all(&report, ResultKind::Applied);
    assert_eq!(
        read(root, RULESET_ITEM),
        "data class RulesetItem(\n    var enabled: Boolean = true,\n    var locked:  Boolean? =\tfalse,\n    var customOutboundTag: String? = null,\n)\n"
    );
}

#[test]
fn test_custom_outbound_diff_mode_leaves_sources() {
    let workspace = setup_mock_workspace();
    let root = workspace.path();
    let out = TempDir::new().unwrap();
    let original = read(root, ROUTING_EDIT);

    let report = run(
        root,
        OutputMode::Diff {
            output_dir: out.path().to_path_buf(),
        },
    );
    assert_all(&report, ResultKind::Applied);
    assert_eq!(read(root, ROUTING_EDIT), original);

    let patch = fs::read_to_string(out.path().join("routing-edit-activity.patch")).unwrap();
    assert!(patch.starts_with(&format!("diff --git a/{ROUTING_EDIT} b/{ROUTING_EDIT}\n")));
    assert!(patch.contains(&format!("--- a/{ROUTING_EDIT}\n+++ b/{ROUTING_EDIT}\n")));
    assert!(patch.contains("-        rulesetItem.outboundTag = outbound_tag[binding.spOutboundTag.selectedItemPosition]\n"));
    assert!(patch.contains("+import com.v2ray.ang.extension.isNotNullEmpty\n"));

    for name in ["ruleset-item-field", "outbound-tag-array", "config-manager"] {
        assert!(out.path().join(format!("{name}.patch")).exists(), "{name}.patch missing");
    }
}

#[test]
fn test_custom_outbound_check_reports_without_writing() {
    let workspace = setup_mock_workspace();
    let root = workspace.path();
    let config = load_from_path(&task_file()).unwrap();
    let before = read(root, CONFIG_MANAGER);

    let report = check_tasks(&config, LocalFs::new(root).unwrap(), None);
    assert_all(&report, ResultKind::Applied);
    assert_eq!(read(root, CONFIG_MANAGER), before);
}

#[test]
fn test_custom_outbound_skips_older_versions() {
    let workspace = setup_mock_workspace();
    let root = workspace.path();
    let config = load_from_path(&task_file()).unwrap();
    let mut orchestrator = PatchOrchestrator::new(LocalFs::new(root).unwrap());

    let report = apply_tasks(&config, &mut orchestrator, Some("1.7.38"));
    assert_all(&report, ResultKind::Skipped);
    assert!(matches!(
        report.tasks[0].result,
        Ok(PatchResult::SkippedVersion { .. })
    ));
    assert!(!read(root, RULESET_ITEM).contains("customOutboundTag"));
}

#[test]
fn test_custom_outbound_upstream_drift_fails_one_task() {
    let workspace = setup_mock_workspace();
    let root = workspace.path();
    let drifted = read(root, ROUTING_EDIT).replace(
        "binding.chkLocked.isChecked = false",
        "binding.chkLocked.isChecked = rulesetItem.locked",
    );
    write(root, ROUTING_EDIT, &drifted);

    let report = run(root, OutputMode::InPlace);
    let kinds: Vec<ResultKind> = report.tasks.iter().map(|t| t.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ResultKind::Applied,
            ResultKind::Applied,
            ResultKind::Failed,
            ResultKind::Applied
        ]
    );
    assert!(!report.is_success());
    assert!(report.tasks[2].message().contains("op 5"));
    assert_eq!(read(root, ROUTING_EDIT), drifted);
}
