//! Worktree state aggregation.
//!
//! This module owns the data model ([`WorktreeRecord`], [`PrRecord`]) and
//! everything that talks to git and gh to populate it: enumeration with
//! bounded fan-out, the batched branch metadata join, PR fetching, and the
//! diff/log builders.

mod diff;
mod parse;
mod repository;

pub use diff::{
    build_commit_diff, build_working_diff, recent_commits, working_status, CommitInfo, DiffLimits,
    LogEntry,
};
pub use repository::Repository;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Branch name shown for a worktree with a detached HEAD.
pub const DETACHED_BRANCH: &str = "(detached)";

/// Pull-request state as reported by the code-review host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

/// Pull-request metadata, joined onto a worktree by exact branch name.
///
/// Absence on a record means "no PR fetched or none exists" — the two cases
/// are deliberately indistinguishable on the record itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrRecord {
    pub number: u32,
    pub state: PrState,
    pub title: String,
    pub url: String,
}

/// One git worktree with everything the dashboard shows for it.
///
/// The whole list is rebuilt atomically on every refresh; records are only
/// ever mutated in place to attach PR data or a divergence summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorktreeRecord {
    /// Absolute path; unique within one snapshot.
    pub path: PathBuf,
    /// Branch name, or [`DETACHED_BRANCH`] for a detached HEAD.
    pub branch: String,
    /// True only for the first worktree in listing order.
    pub is_main: bool,
    /// True when any of `untracked`, `modified`, `staged` is nonzero.
    pub dirty: bool,
    /// Commits ahead of the configured upstream.
    pub ahead: u32,
    /// Commits behind the configured upstream.
    pub behind: u32,
    /// Human-readable commit recency ("3 hours ago"); empty when unknown.
    pub last_active: String,
    /// Unix seconds backing `last_active`; used for sort ordering.
    pub last_active_ts: i64,
    pub pr: Option<PrRecord>,
    pub untracked: u32,
    pub modified: u32,
    pub staged: u32,
    /// Cached "vs main" summary, filled in lazily on detail-view requests.
    pub divergence: Option<String>,
}

impl WorktreeRecord {
    /// Name shown in the worktree table: the path's final component, or
    /// "main" for the main worktree.
    pub fn display_name(&self) -> String {
        if self.is_main {
            return "main".to_string();
        }
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
