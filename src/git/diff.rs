//! Working-tree and commit diff assembly.
//!
//! Builds one unified text from staged, unstaged and untracked changes, with
//! synthetic diffs for untracked content. Size capping happens on the raw
//! text *before* the optional external pretty-printer runs — `delta` may not
//! survive being handed half a hunk.

use std::path::Path;

use crate::process::Runner;

/// Caps applied when assembling diff text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimits {
    /// How many untracked files get a synthetic diff before the note kicks in.
    pub max_untracked_diffs: usize,
    /// Character cap on the assembled text, applied before pretty-printing.
    pub max_diff_chars: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_untracked_diffs: 10,
            max_diff_chars: 200_000,
        }
    }
}

/// Marker appended when diff text is cut at the size cap.
pub(crate) const TRUNCATION_MARKER: &str = "\n\n# [truncated]";

/// Structured commit header from a fixed-format `git show` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub date: String,
    pub subject: String,
    pub body: String,
}

/// One line of recent-commit history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub sha: String,
    pub subject: String,
}

/// Assemble staged, unstaged and untracked changes into one labeled diff.
///
/// Returns the text plus whether the external pretty-printer produced it.
/// Empty sections are omitted; an entirely clean tree yields `("", false)`.
pub fn build_working_diff(runner: &Runner, path: &Path, limits: DiffLimits) -> (String, bool) {
    let (staged, unstaged, untracked) = std::thread::scope(|s| {
        let staged = s.spawn(|| {
            runner.run_with(
                &["git", "diff", "--cached", "--patch", "--no-color"],
                Some(path),
                &[0],
                false,
            )
        });
        let unstaged = s.spawn(|| {
            runner.run_with(
                &["git", "diff", "--patch", "--no-color"],
                Some(path),
                &[0],
                false,
            )
        });
        let untracked = s.spawn(|| {
            runner.run(
                &["git", "ls-files", "--others", "--exclude-standard"],
                Some(path),
            )
        });
        (
            staged.join().unwrap_or_default(),
            unstaged.join().unwrap_or_default(),
            untracked.join().unwrap_or_default(),
        )
    });

    let untracked_files: Vec<&str> = untracked.lines().filter(|f| !f.is_empty()).collect();
    let total = untracked_files.len();
    let shown = total.min(limits.max_untracked_diffs);

    let mut untracked_patches: Vec<String> = Vec::new();
    if total > limits.max_untracked_diffs {
        untracked_patches.push(format!(
            "# Note: Showing first {} untracked files (total: {total})",
            limits.max_untracked_diffs
        ));
    }
    let shown_files = &untracked_files[..shown];
    if !shown_files.is_empty() {
        // `git diff --no-index` exits 1 when the files differ, which for a
        // diff against /dev/null is the normal case.
        let patches: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = shown_files
                .iter()
                .copied()
                .map(|file| {
                    s.spawn(move || {
                        runner.run_with(
                            &[
                                "git", "diff", "--no-index", "--no-color", "--", "/dev/null",
                                file,
                            ],
                            Some(path),
                            &[0, 1],
                            false,
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_default())
                .collect()
        });
        untracked_patches.extend(patches.into_iter().filter(|p| !p.is_empty()));
    }

    let mut parts: Vec<String> = Vec::new();
    if !staged.trim().is_empty() {
        parts.push(format!("# Staged\n{}", staged.trim_matches('\n')));
    }
    if !unstaged.trim().is_empty() {
        parts.push(format!("# Unstaged\n{}", unstaged.trim_matches('\n')));
    }
    if !untracked_patches.is_empty() {
        let joined = untracked_patches
            .iter()
            .map(|p| p.trim_matches('\n'))
            .collect::<Vec<_>>()
            .join("\n\n");
        parts.push(format!("# Untracked\n{joined}"));
    }

    let text = parts.join("\n\n").trim_matches('\n').to_string();
    if text.is_empty() {
        return (String::new(), false);
    }
    pretty_print(runner, truncate_diff(text, limits.max_diff_chars))
}

/// Fixed-format commit header plus the full patch for one commit.
///
/// The header is `None` when the query yields fewer than 4 lines (malformed
/// or missing commit); whatever diff text was found is still returned.
pub fn build_commit_diff(
    runner: &Runner,
    path: &Path,
    sha: &str,
    limits: DiffLimits,
) -> (Option<CommitInfo>, String, bool) {
    let info = commit_info(runner, path, sha);
    let patch = runner.run_with(
        &["git", "show", "--patch", "--no-color", "--pretty=format:", sha],
        Some(path),
        &[0],
        false,
    );
    let text = patch.trim_matches('\n').to_string();
    if text.is_empty() {
        return (info, String::new(), false);
    }
    let (text, used_printer) = pretty_print(runner, truncate_diff(text, limits.max_diff_chars));
    (info, text, used_printer)
}

/// The last `limit` commits as `sha\tsubject` pairs.
pub fn recent_commits(runner: &Runner, path: &Path, limit: usize) -> Vec<LogEntry> {
    let raw = runner.run(
        &["git", "log", &format!("-{limit}"), "--pretty=format:%h%x09%s"],
        Some(path),
    );
    raw.lines()
        .filter_map(|line| {
            let (sha, subject) = line.split_once('\t').unwrap_or((line, ""));
            if sha.is_empty() {
                return None;
            }
            Some(LogEntry {
                sha: sha.to_string(),
                subject: subject.to_string(),
            })
        })
        .collect()
}

/// Raw `git status --short` for the detail pane.
pub fn working_status(runner: &Runner, path: &Path) -> String {
    runner.run(&["git", "status", "--short"], Some(path))
}

fn commit_info(runner: &Runner, path: &Path, sha: &str) -> Option<CommitInfo> {
    let raw = runner.run_with(
        &[
            "git",
            "show",
            "-s",
            "--format=%H%n%an <%ae>%n%ad%n%s%n%b",
            sha,
        ],
        Some(path),
        &[0],
        false,
    );
    if raw.trim().is_empty() {
        return None;
    }
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 4 {
        return None;
    }
    Some(CommitInfo {
        sha: lines[0].trim().to_string(),
        author: lines[1].trim().to_string(),
        date: lines[2].trim().to_string(),
        subject: lines[3].trim().to_string(),
        body: lines[4..].join("\n").trim().to_string(),
    })
}

/// Cut `text` at `max_chars` characters and append the truncation marker.
fn truncate_diff(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// Pipe diff text through `delta` when it is available and succeeds;
/// otherwise fall back to the raw text.
fn pretty_print(runner: &Runner, text: String) -> (String, bool) {
    match runner.filter_through(&["delta", "--no-gitconfig", "--paging=never"], &text) {
        Some(colored) => (colored, true),
        None => (text, false),
    }
}
