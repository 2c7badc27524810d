//! User-facing notifications with once-per-session deduplication.
//!
//! The core never surfaces the same background failure twice: a repository
//! with a broken worktree would otherwise emit one toast per refresh per
//! worktree. Keys are typed ([`NotifyKey`]) rather than concatenated strings
//! so that two different commands failing in the same directory, or the same
//! command failing in two directories, never collide.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashSet;

/// How a notification should be presented by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Deduplication key for [`Notifier::notify_once`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotifyKey {
    /// A command exited with an unexpected code.
    CommandFailed {
        cwd: Option<PathBuf>,
        command: String,
    },
    /// The binary itself is absent from PATH.
    CommandMissing { program: String },
    /// The command could not be spawned for some other reason.
    CommandError {
        cwd: Option<PathBuf>,
        command: String,
    },
    /// `gh pr list` produced output that is not valid JSON.
    PrJsonDecode,
    /// The persisted worktree cache exists but does not parse.
    CacheDecode,
    CacheRead,
    CacheWrite,
    LastSelectedWrite,
}

/// Sink invoked for every surfaced notification. The UI layer supplies this;
/// the headless binary prints to stderr.
pub type NotifySink = dyn Fn(&str, Severity) + Send + Sync;

/// Session-lifetime notification dispatcher.
///
/// The seen-set is only ever reset by process restart. Shared freely across
/// worker threads; the sink must tolerate being called from any of them.
pub struct Notifier {
    seen: DashSet<NotifyKey>,
    sink: Box<NotifySink>,
}

impl Notifier {
    pub fn new(sink: impl Fn(&str, Severity) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            seen: DashSet::new(),
            sink: Box::new(sink),
        })
    }

    /// Surface a notification unconditionally. Used by mutation steps, where
    /// the user just triggered the action and expects feedback every time.
    pub fn notify(&self, message: &str, severity: Severity) {
        (self.sink)(message, severity);
    }

    /// Surface a notification at most once per session for `key`.
    pub fn notify_once(&self, key: NotifyKey, message: &str, severity: Severity) {
        if self.seen.insert(key) {
            (self.sink)(message, severity);
        }
    }
}
