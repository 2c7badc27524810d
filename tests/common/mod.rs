// Not every helper is used by every test binary.
#![allow(dead_code)]

//! Test harness: isolated git repositories in temp directories.
//!
//! Each [`TestRepo`] gets its own global git config (fixed identity and
//! timestamps) so host configuration never leaks into assertions, and is
//! cleaned up when the value drops.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use lazywt::{Notifier, Session, SessionOptions};

pub struct TestRepo {
    tmp: TempDir,
    root: PathBuf,
    gitconfig: PathBuf,
}

impl TestRepo {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("failed to create tempdir");
        let root = tmp.path().join("repo");
        std::fs::create_dir_all(&root).expect("failed to create repo dir");
        let gitconfig = tmp.path().join("gitconfig");
        std::fs::write(
            &gitconfig,
            "[user]\n\tname = Test User\n\temail = test@example.com\n\
             [init]\n\tdefaultBranch = main\n",
        )
        .expect("failed to write gitconfig");

        let repo = Self {
            tmp,
            root,
            gitconfig,
        };
        repo.git(&["init"]);
        repo
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn tmp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Run git in `dir` with the isolated environment, asserting success.
    pub fn git_in(&self, dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_CONFIG_GLOBAL", &self.gitconfig)
            .env("GIT_CONFIG_SYSTEM", "/dev/null")
            .env("GIT_AUTHOR_DATE", "2025-01-01T00:00:00Z")
            .env("GIT_COMMITTER_DATE", "2025-01-01T00:00:00Z")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .expect("failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Run git in the main repo.
    pub fn git(&self, args: &[&str]) -> String {
        self.git_in(&self.root, args)
    }

    /// Write `tracked.txt` and commit everything.
    pub fn commit(&self, message: &str) {
        std::fs::write(self.root.join("tracked.txt"), format!("{message}\n"))
            .expect("failed to write tracked file");
        self.git(&["add", "-A"]);
        self.git(&["commit", "-m", message]);
    }

    /// Create branch `name` and a worktree for it under the temp dir.
    pub fn add_worktree(&self, name: &str) -> PathBuf {
        self.git(&["branch", name]);
        let path = self.tmp.path().join("worktrees").join(name);
        let path_str = path.to_string_lossy().into_owned();
        self.git(&["worktree", "add", path_str.as_str(), name]);
        path
    }
}

/// Session rooted at the test repo, with persisted state confined to the
/// repo's temp dir and notifications discarded.
pub fn dashboard_session(repo: &TestRepo) -> Session {
    let notifier = Notifier::new(|_message, _severity| {});
    let options = SessionOptions {
        repo_dir: Some(repo.root_path().to_path_buf()),
        worktree_root: Some(
            repo.tmp_path()
                .join("state")
                .to_string_lossy()
                .into_owned(),
        ),
        ..SessionOptions::default()
    };
    Session::new(options, notifier)
}

/// Rstest fixture: a fresh isolated repository per test.
#[rstest::fixture]
pub fn repo() -> TestRepo {
    TestRepo::new()
}
