//! Process spawning behind a small capability interface.
//!
//! The orchestrator never touches `std::process` directly: it hands an argv and
//! a [`Wiring`] plan to a [`ProcessBackend`] and gets back a [`RunningProcess`]
//! it can read from, poll and terminate. [`OsBackend`] is the real thing.

use crate::command::{ExitCode, Stdin};
use crate::env::Environment;
use crate::error::{Result, ShellError};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::thread::JoinHandle;

/// Where a child's standard input comes from.
pub enum Input {
    Inherit,
    /// Read end of the previous pipeline stage.
    Pipe(Box<dyn Stdin>),
    /// Output captured from an in-process builtin stage.
    Bytes(Vec<u8>),
}

/// Where a child's standard output or error goes.
#[derive(Debug)]
pub enum Output {
    Inherit,
    /// Kept for the next stage, see [`RunningProcess::take_stdout`].
    Piped,
    File(File),
}

/// Stream plan for one spawn.
pub struct Wiring {
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
}

impl Wiring {
    /// All three streams shared with the interpreter.
    pub fn inherit() -> Self {
        Self {
            stdin: Input::Inherit,
            stdout: Output::Inherit,
            stderr: Output::Inherit,
        }
    }

    pub fn stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn stdout(mut self, stdout: Output) -> Self {
        self.stdout = stdout;
        self
    }
}

/// A spawned child.
pub trait RunningProcess {
    fn id(&self) -> u32;

    /// The read end of the child's stdout when it was spawned with [`Output::Piped`].
    fn take_stdout(&mut self) -> Option<Box<dyn Stdin>>;

    /// Non-blocking status check.
    fn try_wait(&mut self) -> io::Result<Option<ExitCode>>;

    /// Stop the child and reap it.
    fn terminate(&mut self) -> io::Result<()>;
}

/// Something that can start processes.
pub trait ProcessBackend {
    fn spawn(
        &mut self,
        argv: &[String],
        env: &Environment,
        wiring: Wiring,
    ) -> Result<Box<dyn RunningProcess>>;
}

/// Spawns real child processes with `std::process`.
#[derive(Debug, Default)]
pub struct OsBackend;

impl ProcessBackend for OsBackend {
    fn spawn(
        &mut self,
        argv: &[String],
        env: &Environment,
        wiring: Wiring,
    ) -> Result<Box<dyn RunningProcess>> {
        let name = argv.first().map(String::as_str).unwrap_or_default();
        let not_found = || ShellError::CommandNotFound {
            name: name.to_string(),
        };
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let program = find_command_path(OsStr::new(&search_paths), Path::new(name))
            .ok_or_else(not_found)?
            .into_owned();

        let mut feed = None;
        let stdin = match wiring.stdin {
            Input::Inherit => Stdio::inherit(),
            Input::Pipe(reader) => reader.stdio(),
            Input::Bytes(bytes) => {
                feed = Some(bytes);
                Stdio::piped()
            }
        };

        let mut child = std::process::Command::new(&program)
            .args(argv.iter().skip(1))
            .stdin(stdin)
            .stdout(output_stdio(wiring.stdout))
            .stderr(output_stdio(wiring.stderr))
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir)
            .spawn()
            .map_err(|e| {
                tracing::debug!(program = %program.display(), error = %e, "spawn failed");
                not_found()
            })?;
        tracing::debug!(pid = child.id(), program = %program.display(), "spawned");

        // A thread keeps a large builtin output from blocking on a full pipe.
        let feeder = match (feed, child.stdin.take()) {
            (Some(bytes), Some(mut pipe)) => Some(std::thread::spawn(move || {
                if let Err(e) = pipe.write_all(&bytes) {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        tracing::warn!(error = %e, "failed to feed child stdin");
                    }
                }
            })),
            _ => None,
        };

        Ok(Box::new(OsProcess { child, feeder }))
    }
}

fn output_stdio(output: Output) -> Stdio {
    match output {
        Output::Inherit => Stdio::inherit(),
        Output::Piped => Stdio::piped(),
        Output::File(file) => file.into(),
    }
}

struct OsProcess {
    child: Child,
    feeder: Option<JoinHandle<()>>,
}

impl OsProcess {
    fn join_feeder(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
    }
}

impl RunningProcess for OsProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Stdin>> {
        self.child
            .stdout
            .take()
            .map(|out| Box::new(out) as Box<dyn Stdin>)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitCode>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.join_feeder();
        }
        Ok(status.map(status_code))
    }

    fn terminate(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => {}
            // already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait()?;
        self.join_feeder();
        Ok(())
    }
}

/// Exit code of a finished child; a signal death reports `128 + signal`.
pub fn status_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo` on Unix or any `./`-prefixed path on other platforms: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;

    #[cfg(unix)]
    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("Expected to find /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        assert!(find_command_path(osstr("/bin"), path).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nonexistent:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert!(found.as_ref().starts_with("/bin"), "got {:?}", found);
        assert!(found.as_ref().ends_with("sh"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        assert!(find_command_path(osstr("/bin"), Path::new("nonexisting")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn directories_on_path_do_not_match() {
        let tmp_base = std::env::temp_dir().join(format!("minish_path_{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp_base);
        fs::create_dir_all(tmp_base.join("tool")).unwrap();
        let res = find_command_path(tmp_base.as_os_str(), Path::new("tool"));
        let _ = fs::remove_dir_all(&tmp_base);
        assert!(res.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn empty_path_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn signal_death_maps_above_128() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(status_code(ExitStatus::from_raw(3 << 8)), 3);
    }
}
