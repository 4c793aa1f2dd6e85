use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::error::{self, Result, ShellError};
use crate::interpreter::Factory;
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. They never read standard input.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Other names the command answers to.
    fn also_known_as() -> &'static [&'static str] {
        &[]
    }

    /// Executes the command writing to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        match T::execute(*self, stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                error::report(&e);
                Ok(e.exit_status())
            }
        }
    }
}

/// Stands in for a builtin whose arguments did not parse, or that was asked for `--help`.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("minish: {}", self.output.trim_end());
            Ok(1)
        } else {
            stdout.write_all(self.output.as_bytes())?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn handles(&self, name: &str) -> bool {
        name == T::name() || T::also_known_as().contains(&name)
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if !self.handles(name) {
            return None;
        }
        Some(match T::from_args(&[name], args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }
}

/// The builtins every interpreter starts with.
pub fn default_builtins() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Echo>::default()),
        Box::new(Factory::<HistoryCommand>::default()),
        Box::new(Factory::<Alias>::default()),
        Box::new(Factory::<Unalias>::default()),
        Box::new(Factory::<Quit>::default()),
    ]
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the home directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute, relative to the current directory, or starting with `~`.
    pub target: Option<String>,
}

impl Cd {
    fn resolve_target(&self, env: &Environment) -> Result<PathBuf> {
        let home = || {
            env.home_dir()
                .ok_or_else(|| ShellError::DirectoryChangeFailed {
                    path: PathBuf::from("~"),
                    source: io::Error::new(io::ErrorKind::NotFound, "home directory not set"),
                })
        };
        match self.target.as_deref() {
            None | Some("") | Some("~") => home(),
            Some(t) => match t.strip_prefix("~/") {
                Some(rest) => Ok(home()?.join(rest)),
                None => Ok(PathBuf::from(t)),
            },
        }
    }

    fn change_dir(&self, env: &mut Environment) -> Result<()> {
        let target = self.resolve_target(env)?;
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };
        let failed = |source| ShellError::DirectoryChangeFailed {
            path: new_dir.clone(),
            source,
        };

        let canonical = fs::canonicalize(&new_dir).map_err(failed)?;
        env::set_current_dir(&canonical).map_err(failed)?;
        tracing::debug!(dir = %canonical.display(), "changed directory");

        let previous = std::mem::replace(&mut env.current_dir, canonical);
        let pwd = env.current_dir.to_string_lossy().into_owned();
        env.set_var("OLDPWD", previous.to_string_lossy().into_owned());
        env.set_var("PWD", pwd);
        Ok(())
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    /// A failed change is reported but still exits 0.
    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        if let Err(err) = self.change_dir(env) {
            error::report(&err);
        }
        Ok(0)
    }
}

/// write the arguments to standard output, separated by spaces.
/// a leading `-n` suppresses the trailing newline; nothing else is an option.
pub struct Echo {
    pub no_newline: bool,
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> std::result::Result<Self, EarlyExit> {
        let no_newline = args.first() == Some(&"-n");
        let rest = if no_newline { &args[1..] } else { args };
        Ok(Echo {
            no_newline,
            args: rest.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

/// What `history` was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryAction {
    /// Print the newest `n` entries, all of them for 0.
    List(usize),
    Clear,
    /// `-w`: overwrite a file, the session file when no path is given.
    Write(Option<PathBuf>),
    /// `-a`: append to a file, the session file when no path is given.
    Append(Option<PathBuf>),
    Delete { start: usize, end: Option<usize> },
}

/// `history [n | -c | -w [path] | -a [path] | -d start [end]]`
#[derive(Debug)]
pub struct HistoryCommand {
    pub action: HistoryAction,
}

const HISTORY_USAGE: &str = "\
Usage: history [n | -c | -w [path] | -a [path] | -d start [end]]

Display or manipulate the history list.

Options:
  n                 show the newest n entries
  -c                clear the history list
  -w [path]         write the history list to path
  -a [path]         append the history list to path
  -d start [end]    delete an entry, or the entries start..=end
";

impl FromArgs for HistoryCommand {
    fn from_args(_command_name: &[&str], args: &[&str]) -> std::result::Result<Self, EarlyExit> {
        let invalid = || EarlyExit {
            output: ShellError::InvalidHistoryCommand(args.join(" ")).to_string(),
            status: Err(()),
        };
        let index = |s: &str| s.parse::<usize>().map_err(|_| invalid());
        let path = |s: Option<&&str>| s.map(|p| PathBuf::from(*p));

        let action = match args {
            [] => HistoryAction::List(0),
            ["--help"] | ["-h"] => {
                return Err(EarlyExit {
                    output: HISTORY_USAGE.to_string(),
                    status: Ok(()),
                });
            }
            ["-c"] => HistoryAction::Clear,
            ["-w", rest @ ..] if rest.len() <= 1 => HistoryAction::Write(path(rest.first())),
            ["-a", rest @ ..] if rest.len() <= 1 => HistoryAction::Append(path(rest.first())),
            ["-d", start] => HistoryAction::Delete {
                start: index(*start)?,
                end: None,
            },
            ["-d", start, end] => HistoryAction::Delete {
                start: index(*start)?,
                end: Some(index(*end)?),
            },
            [count] => HistoryAction::List(index(*count)?),
            _ => return Err(invalid()),
        };
        Ok(HistoryCommand { action })
    }
}

impl BuiltinCommand for HistoryCommand {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let resolve = |path: Option<PathBuf>, env: &Environment| match path {
            Some(p) if p.is_relative() => env.current_dir.join(p),
            Some(p) => p,
            None => env.history.path().to_path_buf(),
        };
        match self.action {
            HistoryAction::List(count) => {
                let width = env.history.len().to_string().len();
                for (index, line) in env.history.list(count) {
                    writeln!(stdout, "{index:>width$}  {line}")?;
                }
            }
            HistoryAction::Clear => env.history.clear(),
            HistoryAction::Write(path) => {
                let path = resolve(path, env);
                env.history.save(&path, false)?;
            }
            HistoryAction::Append(path) => {
                let path = resolve(path, env);
                env.history.save(&path, true)?;
            }
            HistoryAction::Delete { start, end } => env.history.delete(start, end)?,
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Define or display aliases.
pub struct Alias {
    #[argh(switch, short = 'p')]
    /// print every alias as `alias NAME=VALUE`.
    pub print: bool,

    #[argh(positional, greedy)]
    /// a `name=value` to define an alias, or a `name` to show one.
    pub definitions: Vec<String>,
}

impl BuiltinCommand for Alias {
    fn name() -> &'static str {
        "alias"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        if self.print || self.definitions.is_empty() {
            for (name, value) in &env.aliases {
                writeln!(stdout, "alias {name}={value}")?;
            }
        }
        let mut status = 0;
        for definition in self.definitions {
            match definition.split_once('=') {
                Some(("", _)) => {
                    eprintln!("minish: alias: `{definition}`: invalid alias name");
                    status = 1;
                }
                Some((name, value)) => {
                    env.aliases.insert(name.to_string(), value.to_string());
                }
                None => match env.aliases.get(&definition) {
                    Some(value) => writeln!(stdout, "alias {definition}={value}")?,
                    None => {
                        eprintln!("minish: alias: {definition}: not found");
                        status = 1;
                    }
                },
            }
        }
        Ok(status)
    }
}

#[derive(FromArgs)]
/// Remove aliases from the session.
pub struct Unalias {
    #[argh(switch, short = 'a')]
    /// remove every alias.
    pub all: bool,

    #[argh(positional, greedy)]
    /// names of the aliases to remove.
    pub names: Vec<String>,
}

impl BuiltinCommand for Unalias {
    fn name() -> &'static str {
        "unalias"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        if self.all {
            env.aliases.clear();
            return Ok(0);
        }
        if self.names.is_empty() {
            eprintln!("minish: unalias: usage: unalias [-a] name [name ...]");
            return Ok(1);
        }
        let mut status = 0;
        for name in &self.names {
            if env.aliases.remove(name).is_none() {
                eprintln!("minish: unalias: {name}: not found");
                status = 1;
            }
        }
        Ok(status)
    }
}

#[derive(FromArgs)]
/// Leave the shell, saving history first.
pub struct Quit {
    #[argh(positional)]
    /// exit status of the shell; defaults to the status of the last command.
    pub status: Option<ExitCode>,
}

impl BuiltinCommand for Quit {
    fn name() -> &'static str {
        "quit"
    }

    fn also_known_as() -> &'static [&'static str] {
        &["exit"]
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(self.status.unwrap_or(env.last_status))
    }
}
