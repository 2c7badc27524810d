//! Parsers for git's machine-readable output formats.
//!
//! All parsers here are tolerant: a malformed line is skipped rather than
//! aborting the batch, because exotic branch names and future porcelain
//! attributes must never take down a whole refresh.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use super::{PrRecord, PrState};

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawWorktree {
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// Parse `git worktree list --porcelain` output.
///
/// A `worktree ` line opens a new entry; a `branch ` line attaches the branch
/// (ref namespace stripped) to the entry being built. Other attribute lines
/// (`HEAD`, `detached`, `bare`, ...) are ignored. Git lists the main worktree
/// first; callers rely on that ordering.
pub(crate) fn parse_worktree_list(output: &str) -> Vec<RawWorktree> {
    let mut worktrees = Vec::new();
    let mut current: Option<RawWorktree> = None;
    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(wt) = current.take() {
                worktrees.push(wt);
            }
            current = Some(RawWorktree {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(branch_ref) = line.strip_prefix("branch ") {
            if let Some(wt) = current.as_mut() {
                wt.branch = Some(
                    branch_ref
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch_ref)
                        .to_string(),
                );
            }
        }
    }
    if let Some(wt) = current {
        worktrees.push(wt);
    }
    worktrees
}

/// Counters extracted from `git status --porcelain=v2 --branch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StatusCounts {
    pub ahead: u32,
    pub behind: u32,
    pub untracked: u32,
    pub modified: u32,
    pub staged: u32,
}

/// Parse porcelain v2 status with the branch tracking header.
///
/// `1 XY ...` and `2 XY ...` change lines carry two state columns: X is the
/// index (staged) state, Y the worktree (modified) state. Any non-`.`
/// character in a column increments the corresponding counter.
pub(crate) fn parse_status(output: &str) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for line in output.lines() {
        if let Some(ab) = line.strip_prefix("# branch.ab ") {
            let mut parts = ab.split_whitespace();
            if let (Some(ahead), Some(behind)) = (parts.next(), parts.next()) {
                counts.ahead = ahead.trim_start_matches('+').parse().unwrap_or(0);
                counts.behind = behind.trim_start_matches('-').parse().unwrap_or(0);
            }
        } else if line.starts_with('?') {
            counts.untracked += 1;
        } else if line.starts_with("1 ") || line.starts_with("2 ") {
            if let Some(xy) = line.split_whitespace().nth(1) {
                let mut columns = xy.chars();
                if let (Some(x), Some(y)) = (columns.next(), columns.next()) {
                    if x != '.' {
                        counts.staged += 1;
                    }
                    if y != '.' {
                        counts.modified += 1;
                    }
                }
            }
        }
    }
    counts
}

/// Per-branch `(relative time, unix timestamp)` from one batched
/// `for-each-ref` query with `|`-delimited fields.
pub(crate) fn parse_branch_metadata(output: &str) -> HashMap<String, (String, i64)> {
    let mut map = HashMap::new();
    for line in output.lines() {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 3 {
            continue;
        }
        let ts = match parts[2].trim().parse::<i64>() {
            Ok(ts) => ts,
            Err(_) => continue,
        };
        map.insert(parts[0].to_string(), (parts[1].to_string(), ts));
    }
    map
}

#[derive(Debug, Deserialize)]
struct RawPr {
    #[serde(rename = "headRefName")]
    head_ref_name: String,
    state: PrState,
    number: u32,
    title: String,
    url: String,
}

/// Parse the `gh pr list --json ...` payload into a branch → PR map.
pub(crate) fn parse_pr_list(json: &str) -> Result<HashMap<String, PrRecord>, serde_json::Error> {
    let raw: Vec<RawPr> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|pr| {
            let RawPr {
                head_ref_name,
                state,
                number,
                title,
                url,
            } = pr;
            (
                head_ref_name,
                PrRecord {
                    number,
                    state,
                    title,
                    url,
                },
            )
        })
        .collect())
}
