//! Repository-level queries: enumeration, metadata joins, identity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use once_cell::sync::OnceCell;

use crate::notify::{NotifyKey, Severity};
use crate::process::Runner;
use crate::semaphore::Semaphore;

use super::parse::{self, StatusCounts};
use super::{PrRecord, WorktreeRecord, DETACHED_BRANCH};

/// Cap on in-flight `git status` processes during enumeration. A repository
/// with many worktrees would otherwise fork them all at once.
const STATUS_FAN_OUT_LIMIT: usize = 24;

static STATUS_GATE: LazyLock<Semaphore> = LazyLock::new(|| Semaphore::new(STATUS_FAN_OUT_LIMIT));

/// Repository context for the session: runs git/gh through the process
/// funnel and memoizes lookups that cannot change while the process runs.
pub struct Repository {
    runner: Runner,
    /// Directory repo-level commands run from; `None` inherits the process
    /// working directory.
    base: Option<PathBuf>,
    main_branch: OnceCell<String>,
}

impl Repository {
    /// Repository rooted at the process working directory.
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            base: None,
            main_branch: OnceCell::new(),
        }
    }

    /// Repository rooted at an explicit directory, as if the dashboard had
    /// been started there.
    pub fn at(runner: Runner, base: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            base: Some(base.into()),
            main_branch: OnceCell::new(),
        }
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn base(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    /// The repository's main branch, resolved once per session from the
    /// origin HEAD symref and falling back to "main".
    pub fn main_branch(&self) -> &str {
        self.main_branch.get_or_init(|| {
            let out = self.runner.run(
                &["git", "symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
                self.base(),
            );
            match out.rsplit('/').next() {
                Some(branch) if !branch.is_empty() => branch.to_string(),
                _ => "main".to_string(),
            }
        })
    }

    /// Path of the main worktree: the first entry in listing order.
    pub fn main_worktree_path(&self) -> PathBuf {
        let raw = self
            .runner
            .run(&["git", "worktree", "list", "--porcelain"], self.base());
        for line in raw.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                return PathBuf::from(path);
            }
        }
        match self.base() {
            Some(base) => base.to_path_buf(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Enumerate all worktrees, with per-worktree status counters and the
    /// branch metadata join.
    ///
    /// Status queries run concurrently, admission-gated at a fixed number of
    /// in-flight processes. A failed listing yields an empty vec; the runner
    /// has already notified.
    pub fn list_worktrees(&self) -> Vec<WorktreeRecord> {
        let raw = self
            .runner
            .run(&["git", "worktree", "list", "--porcelain"], self.base());
        if raw.is_empty() {
            return Vec::new();
        }
        let entries = parse::parse_worktree_list(&raw);
        let branch_info = self.branch_metadata();

        let counts: Vec<StatusCounts> = std::thread::scope(|s| {
            let handles: Vec<_> = entries
                .iter()
                .map(|entry| {
                    s.spawn(move || {
                        let _permit = STATUS_GATE.acquire();
                        let status = self.runner.run(
                            &["git", "status", "--porcelain=v2", "--branch"],
                            Some(&entry.path),
                        );
                        parse::parse_status(&status)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_default())
                .collect()
        });

        entries
            .into_iter()
            .zip(counts)
            .enumerate()
            .map(|(index, (entry, counts))| {
                let branch = entry
                    .branch
                    .unwrap_or_else(|| DETACHED_BRANCH.to_string());
                let (last_active, last_active_ts) =
                    branch_info.get(&branch).cloned().unwrap_or_default();
                WorktreeRecord {
                    path: entry.path,
                    is_main: index == 0,
                    dirty: counts.untracked + counts.modified + counts.staged > 0,
                    ahead: counts.ahead,
                    behind: counts.behind,
                    last_active,
                    last_active_ts,
                    pr: None,
                    untracked: counts.untracked,
                    modified: counts.modified,
                    staged: counts.staged,
                    divergence: None,
                    branch,
                }
            })
            .collect()
    }

    /// Last-commit metadata for every local branch, one batched query.
    pub fn branch_metadata(&self) -> HashMap<String, (String, i64)> {
        let raw = self.runner.run(
            &[
                "git",
                "for-each-ref",
                "--format=%(refname:short)|%(committerdate:relative)|%(committerdate:unix)",
                "refs/heads",
            ],
            self.base(),
        );
        parse::parse_branch_metadata(&raw)
    }

    /// Fetch open/merged/closed PR metadata for all branches.
    ///
    /// `None` means the tool produced no output at all (unavailable, failed,
    /// or not a hosted repo); `Some` with an empty map means the host
    /// reported zero PRs. The two are different signals and stay distinct.
    pub fn fetch_pr_map(&self) -> Option<HashMap<String, PrRecord>> {
        let raw = self.runner.run(
            &[
                "gh",
                "pr",
                "list",
                "--state",
                "all",
                "--json",
                "headRefName,state,number,title,url",
                "--limit",
                "100",
            ],
            self.base(),
        );
        if raw.is_empty() {
            return None;
        }
        match parse::parse_pr_list(&raw) {
            Ok(map) => Some(map),
            Err(err) => {
                self.runner.notifier().notify_once(
                    NotifyKey::PrJsonDecode,
                    &format!("Failed to parse PR data: {err}"),
                    Severity::Error,
                );
                None
            }
        }
    }

    /// Ahead/behind of HEAD in `path` relative to the main branch. The left
    /// count is commits only on main (behind), the right count commits only
    /// on HEAD (ahead).
    pub fn divergence_counts(&self, path: &Path) -> Option<(u32, u32)> {
        let range = format!("{}...HEAD", self.main_branch());
        let out = self.runner.run(
            &["git", "rev-list", "--left-right", "--count", &range],
            Some(path),
        );
        let mut parts = out.split_whitespace();
        let behind = parts.next()?.parse().ok()?;
        let ahead = parts.next()?.parse().ok()?;
        Some((ahead, behind))
    }

    /// `git fetch --all --quiet`. Callers follow up with a refresh.
    pub fn fetch_all(&self) {
        self.runner
            .run_with(&["git", "fetch", "--all", "--quiet"], self.base(), &[0], false);
    }

    /// Stable identity for this repository, used to key persisted state.
    ///
    /// Prefers the hosted `owner/repo` name, then the origin URL's trailing
    /// `owner/repo`, then the toplevel directory name. Each probe is quiet —
    /// falling through the chain is routine, not an error.
    pub fn identity(&self) -> String {
        if let Some(name) = self.runner.run_quiet(
            &[
                "gh",
                "repo",
                "view",
                "--json",
                "nameWithOwner",
                "-q",
                ".nameWithOwner",
            ],
            self.base(),
        ) {
            if !name.is_empty() {
                return name;
            }
        }
        if let Some(url) = self
            .runner
            .run_quiet(&["git", "remote", "get-url", "origin"], self.base())
        {
            if let Some(repo) = repo_from_url(&url) {
                return repo;
            }
        }
        if let Some(toplevel) = self
            .runner
            .run_quiet(&["git", "rev-parse", "--show-toplevel"], self.base())
        {
            if let Some(name) = Path::new(&toplevel).file_name() {
                return name.to_string_lossy().into_owned();
            }
        }
        "unknown".to_string()
    }
}

/// Extract the trailing `owner/repo` from a git remote URL.
///
/// Handles the common shapes without a full URL parser:
/// `https://host/owner/repo.git`, `git@host:owner/repo.git`,
/// `ssh://git@host/owner/repo`.
fn repo_from_url(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    let mut tail = url.rsplitn(3, ['/', ':']);
    let repo = tail.next()?;
    let owner = tail.next()?;
    if repo.is_empty() || owner.is_empty() || owner.contains('@') {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_url_parsing_common_formats() {
        assert_eq!(
            repo_from_url("https://github.com/owner/repo.git"),
            Some("owner/repo".to_string())
        );
        assert_eq!(
            repo_from_url("git@github.com:owner/repo.git"),
            Some("owner/repo".to_string())
        );
        assert_eq!(
            repo_from_url("ssh://git@github.com/owner/repo"),
            Some("owner/repo".to_string())
        );
        assert_eq!(
            repo_from_url("  https://gitlab.example.com/group/project\n"),
            Some("group/project".to_string())
        );
        assert_eq!(repo_from_url(""), None);
        assert_eq!(repo_from_url("git@github.com:repo"), None);
    }
}
