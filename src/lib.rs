//! Worktree dashboard core.
//!
//! lazywt aggregates the state an interactive terminal dashboard needs to
//! manage git worktrees: enumeration with status counters, branch and PR
//! metadata joins, diff/log views, a divergence cache, and the create /
//! delete / absorb mutation pipelines. Everything is plain data plus
//! notification callbacks — rendering, keybindings and dialogs belong to the
//! consuming UI, not to this crate.
//!
//! The entry point is [`Session`]: one per process, owning the canonical
//! worktree list and every per-session cache. Background work goes through
//! [`Supervisor`], which gives refreshes and detail views their exclusive,
//! latest-wins semantics.

pub mod config;
pub mod git;
pub mod notify;
mod ops;
pub mod process;
pub mod semaphore;
pub mod session;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{HookCommand, HookConfig, SessionOptions};
pub use git::{
    CommitInfo, DiffLimits, LogEntry, PrRecord, PrState, Repository, WorktreeRecord,
    DETACHED_BRANCH,
};
pub use notify::{Notifier, NotifyKey, Severity};
pub use process::{CommandExecutor, ExecOutput, Runner, SystemExecutor};
pub use session::{filter_worktrees, sort_worktrees, CachedWorktree, Session, SortMode};
pub use supervisor::Supervisor;
