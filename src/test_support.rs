//! Shared test doubles for the process layer.
//!
//! [`ScriptedExecutor`] replaces the operating system: rules map command-line
//! prefixes to canned responses, and every invocation is recorded so tests
//! can assert on exactly which commands were (or were not) issued.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::config::SessionOptions;
use crate::notify::{Notifier, Severity};
use crate::process::{CommandExecutor, ExecOutput};
use crate::session::Session;

/// Canned response for a command-line prefix.
#[derive(Debug, Clone)]
pub enum Response {
    /// Exit 0 with this stdout.
    Output(String),
    /// Nonzero exit with this stderr.
    Fail { code: i32, stderr: String },
    /// Nonzero exit that still produced stdout (`git diff --no-index`).
    FailWithOutput { code: i32, stdout: String },
    /// The binary is absent from PATH.
    NotFound,
}

/// Executor driven by prefix-matched rules. Unmatched commands succeed with
/// empty output, which keeps incidental probes (repo identity, status) from
/// needing a rule in every test.
pub struct ScriptedExecutor {
    rules: Mutex<Vec<(String, Response)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Register a rule; the first matching prefix wins.
    pub fn on(&self, prefix: &str, response: Response) {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.to_string(), response));
    }

    /// Every command line issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn respond(&self, argv: &[&str]) -> io::Result<ExecOutput> {
        let rendered = argv.join(" ");
        self.calls.lock().unwrap().push(rendered.clone());
        let rules = self.rules.lock().unwrap();
        for (prefix, response) in rules.iter() {
            if rendered.starts_with(prefix.as_str()) {
                return match response {
                    Response::Output(stdout) => Ok(ExecOutput {
                        code: Some(0),
                        stdout: stdout.clone().into_bytes(),
                        stderr: Vec::new(),
                    }),
                    Response::Fail { code, stderr } => Ok(ExecOutput {
                        code: Some(*code),
                        stdout: Vec::new(),
                        stderr: stderr.clone().into_bytes(),
                    }),
                    Response::FailWithOutput { code, stdout } => Ok(ExecOutput {
                        code: Some(*code),
                        stdout: stdout.clone().into_bytes(),
                        stderr: Vec::new(),
                    }),
                    Response::NotFound => Err(io::Error::from(io::ErrorKind::NotFound)),
                };
            }
        }
        Ok(ExecOutput {
            code: Some(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, argv: &[&str], _cwd: Option<&Path>) -> io::Result<ExecOutput> {
        self.respond(argv)
    }

    fn execute_with_input(
        &self,
        argv: &[&str],
        _cwd: Option<&Path>,
        _input: &[u8],
    ) -> io::Result<ExecOutput> {
        self.respond(argv)
    }
}

pub type NotificationLog = Arc<Mutex<Vec<(String, Severity)>>>;

/// Notifier whose surfaced messages are captured for assertions.
pub fn recording_notifier() -> (Arc<Notifier>, NotificationLog) {
    let log: NotificationLog = Arc::new(Mutex::new(Vec::new()));
    let sink_log = Arc::clone(&log);
    let notifier = Notifier::new(move |message, severity| {
        sink_log.lock().unwrap().push((message.to_string(), severity));
    });
    (notifier, log)
}

/// Session wired to a scripted executor, with persisted state confined to a
/// temp dir. The TempDir must stay alive as long as the session.
pub fn scripted_session(exec: &Arc<ScriptedExecutor>) -> (Session, NotificationLog, TempDir) {
    let (notifier, log) = recording_notifier();
    let tmp = tempfile::tempdir().expect("tempdir");
    let options = SessionOptions {
        worktree_root: Some(tmp.path().to_string_lossy().into_owned()),
        ..SessionOptions::default()
    };
    let session = Session::with_executor(options, notifier, Arc::clone(exec) as _);
    (session, log, tmp)
}
