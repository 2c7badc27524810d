//! Mutation pipelines: create, delete, absorb.
//!
//! Each operation is a short linear pipeline of external commands with
//! fail-fast short-circuiting: the first failing step aborts everything after
//! it. There is no rollback — a failure at step k leaves the effects of
//! steps 1..k-1 in place, and the step's own error message says what
//! happened. Lifecycle hooks are best-effort: hook problems are reported but
//! never block the primary operation.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;

use crate::config::{HookCommand, HookConfig, HOOK_FILE_NAME};
use crate::git::WorktreeRecord;
use crate::notify::Severity;
use crate::session::Session;

/// Environment exported to lifecycle hooks.
struct HookEnv {
    branch: String,
    main_path: PathBuf,
    worktree_path: PathBuf,
    worktree_name: String,
}

impl HookEnv {
    fn vars(&self) -> [(&'static str, String); 4] {
        [
            ("WORKTREE_BRANCH", self.branch.clone()),
            ("MAIN_WORKTREE_PATH", self.main_path.display().to_string()),
            ("WORKTREE_PATH", self.worktree_path.display().to_string()),
            ("WORKTREE_NAME", self.worktree_name.clone()),
        ]
    }
}

enum HookPhase {
    Init,
    Terminate,
}

impl Session {
    /// Create a worktree for branch `name` under the repo state dir, run
    /// `init_commands`, then re-enumerate.
    pub fn create(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.notifier()
            .notify(&format!("Creating worktree {name}..."), Severity::Info);

        let main_path = self.repository().main_worktree_path();
        let root = self.state_dir();
        if let Err(err) = std::fs::create_dir_all(&root) {
            self.notifier().notify(
                &format!("Failed to create {}: {err}", root.display()),
                Severity::Error,
            );
            return false;
        }
        let new_path = root.join(name);
        let new_path_str = new_path.display().to_string();
        let base = self.repository().base().map(Path::to_path_buf);
        if !self.runner().run_checked(
            &["git", "worktree", "add", new_path_str.as_str(), name],
            base.as_deref(),
            &format!("Failed to create worktree {name}"),
        ) {
            return false;
        }

        let env = HookEnv {
            branch: name.to_string(),
            main_path: main_path.clone(),
            worktree_path: new_path.clone(),
            worktree_name: basename(&new_path),
        };
        self.run_hooks(&main_path, &new_path, &env, HookPhase::Init);

        self.notifier()
            .notify(&format!("Created worktree {name}"), Severity::Info);
        self.refresh();
        true
    }

    /// Remove a worktree and delete its branch after confirmation.
    pub fn delete(&mut self, path: &Path, confirm: impl FnOnce(&WorktreeRecord) -> bool) -> bool {
        let record = match self.find_record(path) {
            Some(record) => record,
            None => return false,
        };
        if record.is_main {
            self.notifier()
                .notify("Cannot delete main worktree", Severity::Error);
            return false;
        }
        if !confirm(&record) {
            return false;
        }
        self.notifier()
            .notify(&format!("Deleting {}...", record.branch), Severity::Info);

        let main_path = self.repository().main_worktree_path();
        self.run_terminate_hooks(&main_path, &record);

        if !self.remove_worktree_and_branch(&record) {
            return false;
        }
        self.notifier().notify("Worktree deleted", Severity::Info);
        self.refresh();
        true
    }

    /// Merge a worktree's branch into main, then remove the worktree and its
    /// branch. A checkout or merge failure aborts before anything is removed
    /// — a branch whose changes were not merged must survive.
    pub fn absorb(&mut self, path: &Path, confirm: impl FnOnce(&WorktreeRecord) -> bool) -> bool {
        let record = match self.find_record(path) {
            Some(record) => record,
            None => return false,
        };
        if record.is_main {
            self.notifier()
                .notify("Cannot absorb main worktree", Severity::Error);
            return false;
        }
        if !confirm(&record) {
            return false;
        }
        self.notifier()
            .notify(&format!("Absorbing {}...", record.branch), Severity::Info);

        let main_path = self.repository().main_worktree_path();
        self.run_terminate_hooks(&main_path, &record);

        let main_branch = self.repository().main_branch().to_string();
        if !self.runner().run_checked(
            &["git", "checkout", main_branch.as_str()],
            Some(&record.path),
            &format!("Failed to checkout {main_branch}"),
        ) {
            return false;
        }
        if !self.runner().run_checked(
            &["git", "merge", "--no-edit", record.branch.as_str()],
            Some(&record.path),
            &format!("Failed to merge {} into {main_branch}", record.branch),
        ) {
            return false;
        }

        if !self.remove_worktree_and_branch(&record) {
            return false;
        }
        self.notifier()
            .notify("Worktree absorbed successfully", Severity::Info);
        self.refresh();
        true
    }

    /// Shared tail of delete and absorb: force-remove the worktree, then
    /// delete its branch. The branch deletion is skipped when removal fails.
    fn remove_worktree_and_branch(&self, record: &WorktreeRecord) -> bool {
        let base = self.repository().base().map(Path::to_path_buf);
        let path_str = record.path.display().to_string();
        if !self.runner().run_checked(
            &["git", "worktree", "remove", "--force", path_str.as_str()],
            base.as_deref(),
            &format!("Failed to remove worktree {path_str}"),
        ) {
            return false;
        }
        self.runner().run_checked(
            &["git", "branch", "-D", record.branch.as_str()],
            base.as_deref(),
            &format!("Failed to delete branch {}", record.branch),
        )
    }

    fn find_record(&self, path: &Path) -> Option<WorktreeRecord> {
        self.worktrees().iter().find(|wt| wt.path == path).cloned()
    }

    fn run_terminate_hooks(&self, main_path: &Path, record: &WorktreeRecord) {
        let env = HookEnv {
            branch: record.branch.clone(),
            main_path: main_path.to_path_buf(),
            worktree_path: record.path.clone(),
            worktree_name: basename(&record.path),
        };
        self.run_hooks(main_path, main_path, &env, HookPhase::Terminate);
    }

    fn run_hooks(&self, main_root: &Path, cwd: &Path, env: &HookEnv, phase: HookPhase) {
        let config = match HookConfig::load(main_root) {
            Ok(Some(config)) => config,
            Ok(None) => return,
            Err(err) => {
                self.notifier().notify(
                    &format!("Error loading {HOOK_FILE_NAME}: {err:#}"),
                    Severity::Error,
                );
                return;
            }
        };
        let commands = match phase {
            HookPhase::Init => &config.init_commands,
            HookPhase::Terminate => &config.terminate_commands,
        };
        for command in commands {
            match command {
                HookCommand::LinkTopSymlinks => {
                    if let Err(err) = link_topsymlinks(&env.main_path, &env.worktree_path) {
                        self.notifier().notify(
                            &format!("Error in link_topsymlinks: {err:#}"),
                            Severity::Error,
                        );
                    }
                }
                HookCommand::Shell(text) => {
                    if let Err(err) = run_shell_hook(text, cwd, env) {
                        self.notifier().notify(
                            &format!("Error running command '{text}': {err}"),
                            Severity::Error,
                        );
                    }
                }
            }
        }
    }
}

/// Run one shell hook to completion. Exit codes are ignored; only spawn
/// failures surface, and the caller reports them without blocking the
/// surrounding operation.
fn run_shell_hook(command: &str, cwd: &Path, env: &HookEnv) -> std::io::Result<()> {
    log::debug!("$ sh -c {:?} [{}]", command, cwd.display());
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env.vars() {
        cmd.env(key, value);
    }
    cmd.output()?;
    Ok(())
}

/// Symlink ignored top-level files plus editor config directories from the
/// main worktree into a new one, so local tool state follows the checkout.
/// Nested paths stay untouched; `.DS_Store` and mypy caches are skipped.
fn link_topsymlinks(main_path: &Path, target_path: &Path) -> anyhow::Result<()> {
    let output = Command::new("git")
        .args(["ls-files", "--others", "--ignored", "--exclude-standard"])
        .current_dir(main_path)
        .output()
        .context("failed to list ignored files")?;
    let listing = String::from_utf8_lossy(&output.stdout);
    for line in listing.lines() {
        let line = line.trim();
        if line.is_empty() || line.contains('/') || line == ".DS_Store" || line.contains(".mypy_cache")
        {
            continue;
        }
        let src = main_path.join(line);
        let dst = target_path.join(line);
        if src.exists() && !dst.exists() {
            let _ = symlink(&src, &dst);
        }
    }
    for editor_dir in [".cursor", ".claude", ".idea", ".vscode"] {
        let src = main_path.join(editor_dir);
        let dst = target_path.join(editor_dir);
        if src.is_dir() && !dst.exists() {
            let _ = symlink(&src, &dst);
        }
    }
    std::fs::create_dir_all(target_path.join("tmp"))?;
    if target_path.join(".envrc").exists() && which::which("direnv").is_ok() {
        let _ = Command::new("direnv")
            .args(["allow", "."])
            .current_dir(target_path)
            .output();
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst)
    } else {
        std::os::windows::fs::symlink_file(src, dst)
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scripted_session, Response, ScriptedExecutor};

    const LISTING: &str = "\
worktree /repo
branch refs/heads/main

worktree /repo/worktrees/feature
branch refs/heads/feature
";

    fn seed_listing(exec: &std::sync::Arc<ScriptedExecutor>) {
        exec.on("git worktree list", Response::Output(LISTING.into()));
        exec.on("git symbolic-ref", Response::Output("origin/main".into()));
    }

    #[test]
    fn absorb_merge_failure_issues_no_removal_commands() {
        let exec = ScriptedExecutor::new();
        seed_listing(&exec);
        exec.on("git checkout", Response::Output(String::new()));
        exec.on(
            "git merge",
            Response::Fail {
                code: 1,
                stderr: "CONFLICT (content): Merge conflict in src/lib.rs".into(),
            },
        );
        let (mut session, log, _tmp) = scripted_session(&exec);
        session.refresh();

        let absorbed = session.absorb(Path::new("/repo/worktrees/feature"), |_| true);
        assert!(!absorbed);
        assert_eq!(exec.count_calls("git worktree remove"), 0);
        assert_eq!(exec.count_calls("git branch -D"), 0);
        assert!(log
            .lock()
            .unwrap()
            .iter()
            .any(|(message, _)| message.contains("Failed to merge feature into main")));
    }

    #[test]
    fn absorb_checkout_failure_aborts_before_merge() {
        let exec = ScriptedExecutor::new();
        seed_listing(&exec);
        exec.on(
            "git checkout",
            Response::Fail {
                code: 1,
                stderr: "error: 'main' is already used by worktree at '/repo'".into(),
            },
        );
        let (mut session, _log, _tmp) = scripted_session(&exec);
        session.refresh();

        assert!(!session.absorb(Path::new("/repo/worktrees/feature"), |_| true));
        assert_eq!(exec.count_calls("git merge"), 0);
        assert_eq!(exec.count_calls("git worktree remove"), 0);
    }

    #[test]
    fn absorb_success_runs_the_full_pipeline_in_order() {
        let exec = ScriptedExecutor::new();
        seed_listing(&exec);
        let (mut session, _log, _tmp) = scripted_session(&exec);
        session.refresh();

        assert!(session.absorb(Path::new("/repo/worktrees/feature"), |_| true));
        let calls = exec.calls();
        let position = |needle: &str| {
            calls
                .iter()
                .position(|call| call.starts_with(needle))
                .unwrap_or_else(|| panic!("missing call: {needle}"))
        };
        let checkout = position("git checkout main");
        let merge = position("git merge --no-edit feature");
        let remove = position("git worktree remove --force");
        let branch_delete = position("git branch -D feature");
        assert!(checkout < merge && merge < remove && remove < branch_delete);
    }

    #[test]
    fn delete_skips_branch_deletion_when_removal_fails() {
        let exec = ScriptedExecutor::new();
        seed_listing(&exec);
        exec.on(
            "git worktree remove",
            Response::Fail {
                code: 1,
                stderr: "fatal: working trees containing submodules".into(),
            },
        );
        let (mut session, _log, _tmp) = scripted_session(&exec);
        session.refresh();

        assert!(!session.delete(Path::new("/repo/worktrees/feature"), |_| true));
        assert_eq!(exec.count_calls("git branch -D"), 0);
    }

    #[test]
    fn delete_rejects_the_main_worktree() {
        let exec = ScriptedExecutor::new();
        seed_listing(&exec);
        let (mut session, log, _tmp) = scripted_session(&exec);
        session.refresh();

        assert!(!session.delete(Path::new("/repo"), |_| true));
        assert_eq!(exec.count_calls("git worktree remove"), 0);
        assert!(log
            .lock()
            .unwrap()
            .iter()
            .any(|(message, _)| message == "Cannot delete main worktree"));
    }

    #[test]
    fn declined_confirmation_runs_nothing() {
        let exec = ScriptedExecutor::new();
        seed_listing(&exec);
        let (mut session, _log, _tmp) = scripted_session(&exec);
        session.refresh();

        assert!(!session.delete(Path::new("/repo/worktrees/feature"), |_| false));
        assert!(!session.absorb(Path::new("/repo/worktrees/feature"), |_| false));
        assert_eq!(exec.count_calls("git worktree remove"), 0);
        assert_eq!(exec.count_calls("git checkout"), 0);
    }

    #[test]
    fn create_failure_stops_before_re_enumeration() {
        let exec = ScriptedExecutor::new();
        seed_listing(&exec);
        exec.on(
            "git worktree add",
            Response::Fail {
                code: 128,
                stderr: "fatal: invalid reference: nope".into(),
            },
        );
        let (mut session, _log, _tmp) = scripted_session(&exec);
        session.refresh();
        let statuses_before = exec.count_calls("git status --porcelain=v2");

        assert!(!session.create("nope"));
        // The main-worktree-path lookup lists once, but no re-enumeration
        // (status fan-out) happens after the failed add.
        assert_eq!(
            exec.count_calls("git status --porcelain=v2"),
            statuses_before
        );
    }

    #[test]
    fn create_success_triggers_exactly_one_re_enumeration() {
        let exec = ScriptedExecutor::new();
        seed_listing(&exec);
        let (mut session, _log, _tmp) = scripted_session(&exec);
        session.refresh();
        let statuses_before = exec.count_calls("git status --porcelain=v2");
        let listings_before = exec.count_calls("git worktree list");

        assert!(session.create("feature2"));
        assert_eq!(exec.count_calls("git worktree add"), 1);
        // One listing from the re-enumeration, one from the
        // main-worktree-path lookup (which is a read, not a rebuild); the
        // status fan-out runs exactly once more, over both listed worktrees.
        assert_eq!(
            exec.count_calls("git worktree list"),
            listings_before + 2
        );
        assert_eq!(
            exec.count_calls("git status --porcelain=v2"),
            statuses_before + 2
        );
    }

    #[test]
    fn blank_name_is_rejected_without_commands() {
        let exec = ScriptedExecutor::new();
        let (mut session, _log, _tmp) = scripted_session(&exec);
        assert!(!session.create("   "));
        assert_eq!(exec.count_calls("git worktree add"), 0);
    }
}
