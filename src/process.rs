//! External process execution.
//!
//! Every command the dashboard runs — git, gh, the optional diff
//! pretty-printer — goes through [`Runner`], which owns the failure policy:
//! nothing here returns an error to the caller. A failed command resolves to
//! an empty string (or `false` for mutation steps) plus a notification, so
//! the calling view can always render *something*.
//!
//! [`CommandExecutor`] is the seam between the dashboard and the operating
//! system. Production uses [`SystemExecutor`]; tests script the process layer
//! with a canned implementation.

use std::io;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;

use crate::notify::{Notifier, NotifyKey, Severity};

/// Captured output of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns a command line and waits for it to finish.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, argv: &[&str], cwd: Option<&Path>) -> io::Result<ExecOutput>;

    /// Run a command with `input` piped to its stdin. Only the optional diff
    /// pretty-printer needs this.
    fn execute_with_input(
        &self,
        argv: &[&str],
        cwd: Option<&Path>,
        input: &[u8],
    ) -> io::Result<ExecOutput>;
}

/// Executes commands on the real system, logging each invocation with timing.
pub struct SystemExecutor;

impl SystemExecutor {
    fn command(argv: &[&str], cwd: Option<&Path>) -> io::Result<Command> {
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;
        let mut cmd = Command::new(program);
        cmd.args(rest);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(&self, argv: &[&str], cwd: Option<&Path>) -> io::Result<ExecOutput> {
        let mut cmd = Self::command(argv, cwd)?;
        let cmd_str = argv.join(" ");
        match cwd {
            Some(dir) => log::debug!("$ {} [{}]", cmd_str, dir.display()),
            None => log::debug!("$ {}", cmd_str),
        }

        let t0 = Instant::now();
        let result = cmd.output();
        let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(output) => log::debug!(
                "cmd={:?} dur={:.1}ms ok={}",
                cmd_str,
                duration_ms,
                output.status.success()
            ),
            Err(err) => log::debug!("cmd={:?} dur={:.1}ms err={}", cmd_str, duration_ms, err),
        }

        let output = result?;
        Ok(ExecOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn execute_with_input(
        &self,
        argv: &[&str],
        cwd: Option<&Path>,
        input: &[u8],
    ) -> io::Result<ExecOutput> {
        let mut cmd = Self::command(argv, cwd)?;
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        log::debug!("$ {} (stdin: {} bytes)", argv.join(" "), input.len());

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        // Feed stdin from a second thread; writing a large diff into the pipe
        // while the child's output buffers fill would otherwise deadlock.
        let output = std::thread::scope(|s| {
            if let Some(mut pipe) = stdin {
                s.spawn(move || {
                    let _ = pipe.write_all(input);
                });
            }
            child.wait_with_output()
        })?;
        Ok(ExecOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// High-level command interface with the dashboard's failure policy baked in.
#[derive(Clone)]
pub struct Runner {
    exec: Arc<dyn CommandExecutor>,
    notifier: Arc<Notifier>,
}

impl Runner {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self::with_executor(Arc::new(SystemExecutor), notifier)
    }

    pub fn with_executor(exec: Arc<dyn CommandExecutor>, notifier: Arc<Notifier>) -> Self {
        Self { exec, notifier }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run a command, accepting only exit code 0 and trimming the output.
    pub fn run(&self, argv: &[&str], cwd: Option<&Path>) -> String {
        self.run_with(argv, cwd, &[0], true)
    }

    /// Run a command. Any exit code in `ok_codes` counts as success; every
    /// failure path resolves to an empty string plus one deduplicated
    /// notification.
    pub fn run_with(
        &self,
        argv: &[&str],
        cwd: Option<&Path>,
        ok_codes: &[i32],
        strip: bool,
    ) -> String {
        match self.exec.execute(argv, cwd) {
            Ok(out) => {
                let code = out.code.unwrap_or(-1);
                if !ok_codes.contains(&code) {
                    let command = argv.join(" ");
                    let detail = diagnostic(&out);
                    let message = if detail.is_empty() {
                        format!("Command failed: {command} (exit {code})")
                    } else {
                        format!("Command failed: {command}: {detail}")
                    };
                    self.notifier.notify_once(
                        NotifyKey::CommandFailed {
                            cwd: cwd.map(Path::to_path_buf),
                            command,
                        },
                        &message,
                        Severity::Error,
                    );
                    return String::new();
                }
                let text = String::from_utf8_lossy(&out.stdout);
                if strip {
                    text.trim().to_string()
                } else {
                    text.into_owned()
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let program = argv.first().copied().unwrap_or("command").to_string();
                self.notifier.notify_once(
                    NotifyKey::CommandMissing {
                        program: program.clone(),
                    },
                    &format!("Command not found: {program}"),
                    Severity::Error,
                );
                String::new()
            }
            Err(err) => {
                let command = argv.join(" ");
                self.notifier.notify_once(
                    NotifyKey::CommandError {
                        cwd: cwd.map(Path::to_path_buf),
                        command: command.clone(),
                    },
                    &format!("Failed to run command: {command}: {err}"),
                    Severity::Error,
                );
                String::new()
            }
        }
    }

    /// Mutation-step variant: succeeds only on exit code 0 and reports every
    /// failure immediately, without deduplication — the user just asked for
    /// this action and expects feedback each time.
    pub fn run_checked(&self, argv: &[&str], cwd: Option<&Path>, error_prefix: &str) -> bool {
        let out = match self.exec.execute(argv, cwd) {
            Ok(out) => out,
            Err(err) => {
                self.notifier
                    .notify(&format!("{error_prefix}: {err}"), Severity::Error);
                return false;
            }
        };
        if out.success() {
            return true;
        }
        let detail = diagnostic(&out);
        if detail.is_empty() {
            self.notifier.notify(error_prefix, Severity::Error);
        } else {
            self.notifier
                .notify(&format!("{error_prefix}: {detail}"), Severity::Error);
        }
        false
    }

    /// Quiet probe: no notification on any failure. Used where a fallback
    /// chain makes failure routine, e.g. repository identity resolution.
    pub fn run_quiet(&self, argv: &[&str], cwd: Option<&Path>) -> Option<String> {
        let out = self.exec.execute(argv, cwd).ok()?;
        if !out.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Pipe `input` through a filter program and return its stdout, or `None`
    /// when the filter is unavailable or exits nonzero. Callers fall back to
    /// the unfiltered text.
    pub fn filter_through(&self, argv: &[&str], input: &str) -> Option<String> {
        let out = self
            .exec
            .execute_with_input(argv, None, input.as_bytes())
            .ok()?;
        if !out.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

fn diagnostic(out: &ExecOutput) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}
