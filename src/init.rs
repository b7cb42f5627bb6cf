//! Hook installation
//!
//! Adds a `cli-rts emit <slug>` command hook for every event the daemon
//! understands to `<project>/.claude/settings.json`, and keeps the snapshot
//! directory out of git.
//!
//! Installed entries carry `"__cli_rts": true` so they can be recognized on
//! later runs. Everything else in the settings file (user hooks, permissions,
//! env) is left untouched.

use crate::errors::CliRtsError;
use crate::event::EventKind;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Marker key identifying hooks installed by this tool
const MARKER: &str = "__cli_rts";

/// Line added to `.gitignore`
const GITIGNORE_ENTRY: &str = ".cli-rts/";

/// Result of one `init` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    pub added: usize,
    pub skipped: usize,
    /// Previously installed entries dropped by `--force`
    pub removed: usize,
    pub gitignore_updated: bool,
}

fn hook_config(kind: EventKind) -> Value {
    json!({
        "hooks": [{
            "type": "command",
            "command": format!("cli-rts emit {}", kind.slug()),
            "async": true,
            MARKER: true,
        }]
    })
}

fn is_ours(hook: &Value) -> bool {
    hook.get(MARKER).and_then(Value::as_bool) == Some(true)
}

fn config_has_ours(config: &Value) -> bool {
    config
        .get("hooks")
        .and_then(Value::as_array)
        .is_some_and(|hooks| hooks.iter().any(is_ours))
}

/// Strip our hooks from every event; configs left with no hooks are dropped
fn remove_installed(hooks: &mut Map<String, Value>) -> usize {
    let mut removed = 0;
    for configs in hooks.values_mut() {
        let Some(configs) = configs.as_array_mut() else {
            continue;
        };
        for config in configs.iter_mut() {
            if let Some(list) = config.get_mut("hooks").and_then(Value::as_array_mut) {
                let before = list.len();
                list.retain(|h| !is_ours(h));
                removed += before - list.len();
            }
        }
        configs.retain(|config| {
            config
                .get("hooks")
                .and_then(Value::as_array)
                .is_none_or(|list| !list.is_empty())
        });
    }
    removed
}

/// Merge our hooks into a parsed settings document
///
/// Returns `(added, skipped, removed)`. Fails only when `hooks` or one of its
/// event entries has a shape we cannot extend without discarding user data.
pub fn merge_hooks(settings: &mut Value, force: bool) -> Result<(usize, usize, usize), String> {
    let root = settings
        .as_object_mut()
        .ok_or_else(|| "settings.json is not a JSON object".to_string())?;
    let hooks = root
        .entry("hooks")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| "\"hooks\" is not a JSON object".to_string())?;

    let removed = if force { remove_installed(hooks) } else { 0 };

    let mut added = 0;
    let mut skipped = 0;
    for kind in EventKind::ALL {
        let configs = hooks
            .entry(kind.hook_name())
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| format!("\"hooks.{}\" is not an array", kind.hook_name()))?;

        if configs.iter().any(config_has_ours) {
            skipped += 1;
            continue;
        }
        configs.push(hook_config(kind));
        added += 1;
    }

    Ok((added, skipped, removed))
}

/// Append `.cli-rts/` to `.gitignore` unless already present
pub fn ensure_gitignore(project: &Path) -> std::io::Result<bool> {
    let path = project.join(".gitignore");
    let existing = if path.exists() {
        fs::read_to_string(&path)?
    } else {
        String::new()
    };

    if existing.contains(GITIGNORE_ENTRY) {
        return Ok(false);
    }

    let separator = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    fs::write(&path, format!("{existing}{separator}{GITIGNORE_ENTRY}\n"))?;
    Ok(true)
}

/// Install hooks into a single project
pub fn init_project(project: &Path, force: bool) -> Result<InitReport, CliRtsError> {
    let name = project.file_name().map_or_else(
        || project.display().to_string(),
        |n| n.to_string_lossy().to_string(),
    );
    let fail = |reason: String| CliRtsError::InitError {
        project: name.clone(),
        reason,
    };

    if !project.is_dir() {
        return Err(fail(format!("Not a directory: {}", project.display())));
    }

    let claude_dir = project.join(".claude");
    if !claude_dir.exists() {
        fs::create_dir_all(&claude_dir)
            .map_err(|e| fail(format!("Failed to create .claude directory: {e}")))?;
        tracing::debug!(dir = %claude_dir.display(), "Created .claude directory");
    }

    let settings_path = claude_dir.join("settings.json");
    let mut settings = if settings_path.exists() {
        let content = fs::read_to_string(&settings_path)
            .map_err(|e| fail(format!("Failed to read existing settings: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| fail(format!("Failed to parse existing settings: {e}")))?
    } else {
        Value::Object(Map::new())
    };

    let (added, skipped, removed) = merge_hooks(&mut settings, force).map_err(&fail)?;

    let formatted = serde_json::to_string_pretty(&settings)
        .map_err(|e| fail(format!("Failed to serialize settings: {e}")))?;
    fs::write(&settings_path, formatted + "\n")
        .map_err(|e| fail(format!("Failed to write settings: {e}")))?;

    let gitignore_updated = ensure_gitignore(project)
        .map_err(|e| fail(format!("Failed to update .gitignore: {e}")))?;

    tracing::info!(project = %name, added, skipped, removed, "Hooks installed");
    Ok(InitReport {
        added,
        skipped,
        removed,
        gitignore_updated,
    })
}

/// Run init command
pub fn run(path: Option<PathBuf>, force: bool) -> Result<(), CliRtsError> {
    let project = match path {
        Some(p) => p,
        None => std::env::current_dir()?,
    };

    let report = init_project(&project, force)?;
    if report.removed > 0 {
        println!("Removed {} previously installed hooks", report.removed);
    }
    println!(
        "Updated .claude/settings.json: {} hooks added, {} already present",
        report.added, report.skipped
    );
    if report.gitignore_updated {
        println!("Added {GITIGNORE_ENTRY} to .gitignore");
    }
    println!("\nDone! Run `cli-rts start` to start the daemon.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_settings(project: &Path) -> Value {
        let content = fs::read_to_string(project.join(".claude/settings.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn test_init_new_project() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path();

        let report = init_project(project, false).unwrap();
        assert_eq!(report.added, 13);
        assert_eq!(report.skipped, 0);
        assert!(report.gitignore_updated);

        let parsed = read_settings(project);
        let hooks = parsed["hooks"].as_object().unwrap();
        assert_eq!(hooks.len(), 13);

        let pre_tool = &parsed["hooks"]["PreToolUse"][0]["hooks"][0];
        assert_eq!(pre_tool["type"], "command");
        assert_eq!(pre_tool["command"], "cli-rts emit pre-tool");
        assert_eq!(pre_tool["async"], true);
        assert_eq!(pre_tool[MARKER], true);

        assert_eq!(
            parsed["hooks"]["UserPromptSubmit"][0]["hooks"][0]["command"],
            "cli-rts emit user-prompt"
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path();

        assert_eq!(init_project(project, false).unwrap().added, 13);
        let second = init_project(project, false).unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped, 13);
        assert!(!second.gitignore_updated);

        let parsed = read_settings(project);
        assert_eq!(parsed["hooks"]["Stop"].as_array().unwrap().len(), 1);
        let gitignore = fs::read_to_string(project.join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(GITIGNORE_ENTRY).count(), 1);
    }

    #[test]
    fn test_init_merge_with_existing() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path();
        fs::create_dir(project.join(".claude")).unwrap();

        let existing = r#"{
            "permissions": {"allow": ["Read"]},
            "hooks": {
                "PreToolUse": [{
                    "matcher": "*",
                    "hooks": [{"type": "command", "command": "echo user hook"}]
                }]
            }
        }"#;
        fs::write(project.join(".claude/settings.json"), existing).unwrap();

        init_project(project, false).unwrap();

        let parsed = read_settings(project);
        let pre_tool = parsed["hooks"]["PreToolUse"].as_array().unwrap();
        assert_eq!(pre_tool.len(), 2, "user hook kept, ours appended");
        assert_eq!(pre_tool[0]["hooks"][0]["command"], "echo user hook");
        assert_eq!(pre_tool[1]["hooks"][0]["command"], "cli-rts emit pre-tool");
        assert!(parsed["permissions"]["allow"].is_array());
    }

    #[test]
    fn test_init_force_reinstalls() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path();
        fs::create_dir(project.join(".claude")).unwrap();

        // Stale command from an older install, sharing a config with a user hook
        let existing = r#"{
            "hooks": {
                "Stop": [{
                    "hooks": [
                        {"type": "command", "command": "echo mine"},
                        {"type": "command", "command": "old-cli-rts emit stop", "__cli_rts": true}
                    ]
                }],
                "SessionEnd": [{
                    "hooks": [{"type": "command", "command": "old-cli-rts emit session-end", "__cli_rts": true}]
                }]
            }
        }"#;
        fs::write(project.join(".claude/settings.json"), existing).unwrap();

        let report = init_project(project, true).unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.added, 13);

        let parsed = read_settings(project);
        let stop = parsed["hooks"]["Stop"].as_array().unwrap();
        assert_eq!(stop.len(), 2);
        assert_eq!(stop[0]["hooks"].as_array().unwrap().len(), 1);
        assert_eq!(stop[0]["hooks"][0]["command"], "echo mine");
        assert_eq!(stop[1]["hooks"][0]["command"], "cli-rts emit stop");

        let session_end = parsed["hooks"]["SessionEnd"].as_array().unwrap();
        assert_eq!(session_end.len(), 1, "emptied config dropped");
        assert_eq!(session_end[0]["hooks"][0]["command"], "cli-rts emit session-end");
    }

    #[test]
    fn test_init_rejects_malformed_settings() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path();
        fs::create_dir(project.join(".claude")).unwrap();
        fs::write(project.join(".claude/settings.json"), "{ not json").unwrap();

        let err = init_project(project, false).unwrap_err();
        assert!(matches!(err, CliRtsError::InitError { .. }));
        // The broken file is left for the user to fix
        assert_eq!(
            fs::read_to_string(project.join(".claude/settings.json")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_merge_rejects_unexpected_shapes() {
        let mut settings = json!([]);
        assert!(merge_hooks(&mut settings, false).is_err());

        let mut settings = json!({"hooks": []});
        assert!(merge_hooks(&mut settings, false).is_err());

        let mut settings = json!({"hooks": {"Stop": "echo"}});
        assert!(merge_hooks(&mut settings, false).is_err());
    }

    #[test]
    fn test_init_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let err = init_project(&tmp.path().join("nope"), false).unwrap_err();
        assert!(err.to_string().contains("Not a directory"));
    }

    #[test]
    fn test_gitignore_appends_newline() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path();
        fs::write(project.join(".gitignore"), "target").unwrap();

        assert!(ensure_gitignore(project).unwrap());
        assert_eq!(
            fs::read_to_string(project.join(".gitignore")).unwrap(),
            "target\n.cli-rts/\n"
        );
        assert!(!ensure_gitignore(project).unwrap());
    }
}
