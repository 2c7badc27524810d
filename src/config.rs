//! Session options and the per-repository lifecycle-hook file.
//!
//! The hook file (`.wt.toml` at the main worktree root) lets a repository
//! declare commands to run when a worktree is created or torn down:
//!
//! ```toml
//! init_commands = ["link_topsymlinks", "npm install"]
//! terminate_commands = ["docker compose down"]
//! ```
//!
//! The `link_topsymlinks` token is resolved into a tagged variant at parse
//! time, not pattern-matched against the string on every execution.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use crate::git::DiffLimits;

/// Lifecycle-hook file name, looked up at the main worktree root.
pub const HOOK_FILE_NAME: &str = ".wt.toml";

const LINK_TOPSYMLINKS_TOKEN: &str = "link_topsymlinks";

/// One lifecycle-hook entry, resolved at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCommand {
    /// Run through `sh -c` with the worktree environment exported.
    Shell(String),
    /// Built-in: symlink ignored top-level files and editor directories from
    /// the main worktree into the new one.
    LinkTopSymlinks,
}

impl<'de> Deserialize<'de> for HookCommand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CommandVisitor;

        impl Visitor<'_> for CommandVisitor {
            type Value = HookCommand;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a shell command string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<HookCommand, E> {
                let text = value.trim();
                if text == LINK_TOPSYMLINKS_TOKEN {
                    Ok(HookCommand::LinkTopSymlinks)
                } else {
                    Ok(HookCommand::Shell(text.to_string()))
                }
            }
        }

        deserializer.deserialize_str(CommandVisitor)
    }
}

/// Per-repository lifecycle hooks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub init_commands: Vec<HookCommand>,
    #[serde(default)]
    pub terminate_commands: Vec<HookCommand>,
}

impl HookConfig {
    /// Load the hook file from `main_root`.
    ///
    /// `Ok(None)` when the file is absent; `Err` when it exists but is
    /// unreadable or malformed. Callers report the error and skip hooks —
    /// the surrounding operation still proceeds.
    pub fn load(main_root: &Path) -> anyhow::Result<Option<Self>> {
        let path = main_root.join(HOOK_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.init_commands.retain(is_nonempty);
        config.terminate_commands.retain(is_nonempty);
        Ok(Some(config))
    }
}

fn is_nonempty(command: &HookCommand) -> bool {
    !matches!(command, HookCommand::Shell(text) if text.is_empty())
}

/// Session-level options supplied by the (out-of-scope) config/CLI layer.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory to treat as the repository, as if the dashboard had been
    /// started there. `None` inherits the process working directory.
    pub repo_dir: Option<PathBuf>,
    /// Root under which per-repository worktrees and persisted state live;
    /// `~` is expanded. Defaults to `<user data dir>/worktrees`.
    pub worktree_root: Option<String>,
    /// Sort the worktree table by last activity rather than by path.
    pub sort_by_active: bool,
    pub limits: DiffLimits,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            repo_dir: None,
            worktree_root: None,
            sort_by_active: true,
            limits: DiffLimits::default(),
        }
    }
}

impl SessionOptions {
    /// Resolve the worktree root directory.
    pub fn resolved_worktree_root(&self) -> PathBuf {
        if let Some(root) = &self.worktree_root {
            return PathBuf::from(shellexpand::tilde(root).into_owned());
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("worktrees")
    }
}
