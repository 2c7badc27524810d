//! Headless entry point: refresh once and print the worktree table.
//!
//! The interactive dashboard wraps the same [`Session`] API; this binary
//! exists so the core can be driven end-to-end from a shell. An optional
//! positional argument filters the table by substring.

use std::sync::Arc;

use lazywt::{Notifier, Session, SessionOptions, Severity};

fn main() {
    env_logger::init();

    let filter = std::env::args().nth(1).unwrap_or_default();
    let notifier: Arc<Notifier> = Notifier::new(|message, severity| match severity {
        Severity::Info => eprintln!("{message}"),
        Severity::Warning | Severity::Error => eprintln!("{severity}: {message}"),
    });

    let mut session = Session::new(SessionOptions::default(), notifier);
    session.refresh();

    let visible = session.visible_worktrees(&filter);
    if visible.is_empty() {
        eprintln!("no worktrees found");
        std::process::exit(1);
    }
    for wt in visible {
        let dirty = if wt.dirty { "*" } else { " " };
        let pr = match &wt.pr {
            Some(pr) => format!("#{} {}", pr.number, pr.state),
            None => "-".to_string(),
        };
        println!(
            "{dirty} {:<24} {:<24} \u{2191}{} \u{2193}{}  {:<12} {}",
            wt.display_name(),
            wt.branch,
            wt.ahead,
            wt.behind,
            pr,
            wt.last_active,
        );
    }
}
