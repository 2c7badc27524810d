//! Session-scoped dashboard state.
//!
//! One [`Session`] exists per process: it owns the canonical worktree list,
//! the divergence cache, the memoized repository key and the persisted state
//! files. Workers compute new data off-thread; only the session's owner
//! applies it, so the canonical list never sees interleaved writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::config::SessionOptions;
use crate::git::{self, CommitInfo, LogEntry, Repository, WorktreeRecord};
use crate::notify::{Notifier, NotifyKey, Severity};
use crate::process::{CommandExecutor, Runner};

/// Cold-start snapshot file, inside the repo state dir.
pub const CACHE_FILENAME: &str = ".worktree-cache.json";
/// File remembering the last selected worktree path.
pub const LAST_SELECTED_FILENAME: &str = ".last-selected";

/// Sort order for the worktree table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SortMode {
    #[strum(serialize = "Last Active")]
    LastActive,
    #[strum(serialize = "Path")]
    Path,
}

/// Snapshot entry persisted for fast cold-start rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedWorktree {
    pub path: PathBuf,
    pub branch: String,
    pub last_active_ts: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    worktrees: Vec<CachedWorktree>,
}

/// All mutable dashboard state for one repository, for one process lifetime.
pub struct Session {
    options: SessionOptions,
    repo: Repository,
    notifier: Arc<Notifier>,
    worktrees: Vec<WorktreeRecord>,
    divergence_cache: HashMap<(PathBuf, String), String>,
    repo_key: OnceCell<String>,
    pr_data_loaded: bool,
}

impl Session {
    pub fn new(options: SessionOptions, notifier: Arc<Notifier>) -> Self {
        let runner = Runner::new(Arc::clone(&notifier));
        Self::with_runner(options, notifier, runner)
    }

    /// Build a session around a custom executor. Tests script the process
    /// layer through this.
    pub fn with_executor(
        options: SessionOptions,
        notifier: Arc<Notifier>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let runner = Runner::with_executor(executor, Arc::clone(&notifier));
        Self::with_runner(options, notifier, runner)
    }

    fn with_runner(options: SessionOptions, notifier: Arc<Notifier>, runner: Runner) -> Self {
        let repo = match &options.repo_dir {
            Some(dir) => Repository::at(runner, dir.clone()),
            None => Repository::new(runner),
        };
        Self {
            options,
            repo,
            notifier,
            worktrees: Vec::new(),
            divergence_cache: HashMap::new(),
            repo_key: OnceCell::new(),
            pr_data_loaded: false,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub(crate) fn runner(&self) -> &Runner {
        self.repo.runner()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// The canonical worktree list from the last refresh.
    pub fn worktrees(&self) -> &[WorktreeRecord] {
        &self.worktrees
    }

    /// Rebuild the canonical worktree list from scratch and persist the
    /// cold-start snapshot. PR data must be re-fetched after a refresh.
    pub fn refresh(&mut self) {
        self.pr_data_loaded = false;
        self.worktrees = self.repo.list_worktrees();
        self.save_cache();
    }

    /// Join PR metadata onto the current list.
    ///
    /// The fetch is explicit and idempotent: repeating it without an
    /// intervening refresh is a visible no-op, not a re-fetch — the host
    /// query is slow and rate-limited.
    pub fn fetch_pr_data(&mut self) -> bool {
        if self.pr_data_loaded {
            self.notifier.notify(
                "PR data already loaded. Refresh to re-fetch.",
                Severity::Info,
            );
            return true;
        }
        let pr_map = match self.repo.fetch_pr_map() {
            Some(map) => map,
            None => return false,
        };
        for wt in &mut self.worktrees {
            if let Some(pr) = pr_map.get(&wt.branch) {
                wt.pr = Some(pr.clone());
            }
        }
        self.pr_data_loaded = true;
        true
    }

    /// "vs main" summary for one worktree, memoized per `(path, branch)`.
    ///
    /// The cache is never invalidated within a session; a base-branch rebase
    /// can leave a stale entry until restart.
    pub fn divergence(&mut self, path: &Path, branch: &str) -> String {
        let key = (path.to_path_buf(), branch.to_string());
        if let Some(cached) = self.divergence_cache.get(&key) {
            return cached.clone();
        }

        let mut precomputed = None;
        let mut is_main = false;
        if let Some(wt) = self.worktrees.iter().find(|w| w.path == path) {
            precomputed = wt.divergence.clone();
            is_main = wt.is_main;
        }
        if let Some(value) = precomputed {
            self.divergence_cache.insert(key, value.clone());
            return value;
        }
        // The main worktree never diverges from itself.
        if is_main {
            return String::new();
        }

        let (ahead, behind) = match self.repo.divergence_counts(path) {
            Some(counts) => counts,
            None => return String::new(),
        };
        let value = format!("Main: ↑{ahead} ↓{behind}");
        if let Some(wt) = self.worktrees.iter_mut().find(|w| w.path == path) {
            wt.divergence = Some(value.clone());
        }
        self.divergence_cache.insert(key, value.clone());
        value
    }

    pub fn build_working_diff(&self, path: &Path) -> (String, bool) {
        git::build_working_diff(self.runner(), path, self.options.limits)
    }

    pub fn build_commit_diff(&self, path: &Path, sha: &str) -> (Option<CommitInfo>, String, bool) {
        git::build_commit_diff(self.runner(), path, sha, self.options.limits)
    }

    pub fn recent_commits(&self, path: &Path) -> Vec<LogEntry> {
        git::recent_commits(self.runner(), path, 20)
    }

    pub fn working_status(&self, path: &Path) -> String {
        git::working_status(self.runner(), path)
    }

    /// Fetch all remotes. Callers follow up with [`refresh`](Self::refresh).
    pub fn fetch_remotes(&self) {
        self.repo.fetch_all();
    }

    /// Records matching `query`, in the session's configured sort order.
    pub fn visible_worktrees(&self, query: &str) -> Vec<&WorktreeRecord> {
        let mut records = filter_worktrees(&self.worktrees, query);
        let mode = if self.options.sort_by_active {
            SortMode::LastActive
        } else {
            SortMode::Path
        };
        sort_worktrees(&mut records, mode);
        records
    }

    /// Stable repository key, resolved once per session.
    pub fn repo_key(&self) -> &str {
        self.repo_key.get_or_init(|| self.repo.identity())
    }

    /// Directory holding this repository's worktrees and persisted state.
    pub fn state_dir(&self) -> PathBuf {
        self.options.resolved_worktree_root().join(self.repo_key())
    }

    fn cache_path(&self) -> PathBuf {
        self.state_dir().join(CACHE_FILENAME)
    }

    fn last_selected_path(&self) -> PathBuf {
        self.state_dir().join(LAST_SELECTED_FILENAME)
    }

    /// Cold-start snapshot from the previous run; empty when unavailable.
    pub fn load_cached_worktrees(&self) -> Vec<CachedWorktree> {
        let path = self.cache_path();
        if !path.exists() {
            return Vec::new();
        }
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                self.notifier.notify_once(
                    NotifyKey::CacheRead,
                    &format!("Failed to read cache file: {err}"),
                    Severity::Error,
                );
                return Vec::new();
            }
        };
        match serde_json::from_str::<CacheFile>(&raw) {
            Ok(cache) => cache.worktrees,
            Err(err) => {
                self.notifier.notify_once(
                    NotifyKey::CacheDecode,
                    &format!("Invalid cache file format: {err}"),
                    Severity::Error,
                );
                Vec::new()
            }
        }
    }

    fn save_cache(&self) {
        let cache = CacheFile {
            worktrees: self
                .worktrees
                .iter()
                .map(|wt| CachedWorktree {
                    path: wt.path.clone(),
                    branch: wt.branch.clone(),
                    last_active_ts: wt.last_active_ts,
                })
                .collect(),
        };
        if let Err(err) = self.write_cache(&cache) {
            self.notifier.notify_once(
                NotifyKey::CacheWrite,
                &format!("Failed to write cache file: {err}"),
                Severity::Error,
            );
        }
    }

    fn write_cache(&self, cache: &CacheFile) -> anyhow::Result<()> {
        let path = self.cache_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, serde_json::to_string(cache)?)?;
        Ok(())
    }

    /// Remember the selection for the next run.
    pub fn select_worktree(&self, path: &Path) {
        let target = self.last_selected_path();
        let write = || -> anyhow::Result<()> {
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&target, format!("{}\n", path.display()))?;
            Ok(())
        };
        if let Err(err) = write() {
            self.notifier.notify_once(
                NotifyKey::LastSelectedWrite,
                &format!("Failed to save last selected worktree: {err}"),
                Severity::Error,
            );
        }
    }

    /// Previously selected worktree path, if one was recorded.
    pub fn last_selected(&self) -> Option<PathBuf> {
        let raw = std::fs::read_to_string(self.last_selected_path()).ok()?;
        let line = raw.lines().next()?.trim();
        if line.is_empty() {
            return None;
        }
        Some(PathBuf::from(line))
    }
}

/// Case-insensitive substring filter over display name and branch. The full
/// path joins the haystack only when the query itself contains a path
/// separator — filtering by "feat" should not match every path under
/// `/home/user/features-repo/`.
pub fn filter_worktrees<'a>(records: &'a [WorktreeRecord], query: &str) -> Vec<&'a WorktreeRecord> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return records.iter().collect();
    }
    let match_path = query.contains('/');
    records
        .iter()
        .filter(|wt| {
            if wt.display_name().to_lowercase().contains(&query)
                || wt.branch.to_lowercase().contains(&query)
            {
                return true;
            }
            match_path && wt.path.to_string_lossy().to_lowercase().contains(&query)
        })
        .collect()
}

/// Order records for display.
pub fn sort_worktrees(records: &mut [&WorktreeRecord], mode: SortMode) {
    match mode {
        SortMode::LastActive => records.sort_by_key(|wt| std::cmp::Reverse(wt.last_active_ts)),
        SortMode::Path => records.sort_by(|a, b| a.path.cmp(&b.path)),
    }
}
