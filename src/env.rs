use crate::command::ExitCode;
use crate::history::History;
use std::collections::{BTreeMap, HashMap};
use std::env as stdenv;
use std::path::PathBuf;

/// Invocation word → expansion text. Session-scoped, never written back to config.
pub type AliasTable = BTreeMap<String, String>;

/// Mutable session state owned by the dispatch loop.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit`: set by `quit`/`exit` or an interrupt; the REPL stops when it is true.
/// - `last_status`: exit status of the previous dispatch cycle, read by `$?`.
/// - `history` and `aliases`: the session's history buffer and alias table.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that an interactive loop should exit.
    pub should_exit: bool,
    /// Exit status of the most recently completed command line.
    pub last_status: ExitCode,
    pub history: History,
    pub aliases: AliasTable,
}

impl Environment {
    /// Capture the current process state into a new `Environment`.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`.
    pub fn new(history: History, aliases: AliasTable) -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
            last_status: 0,
            history,
            aliases,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// The user's home directory: `$HOME` first, then the platform lookup.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.get_var("HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .or_else(|| directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()))
    }

    /// Resolve a `$` parameter the way `echo` sees it.
    ///
    /// `?` is the last exit status, `$` the interpreter's pid; anything else is an
    /// environment variable, empty when unset.
    pub fn expand_param(&self, name: &str) -> String {
        match name {
            "?" => self.last_status.to_string(),
            "$" => std::process::id().to_string(),
            _ => self.get_var(name).unwrap_or_default(),
        }
    }
}
