use crate::builtin::default_builtins;
use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::config::{self, Config};
use crate::env::Environment;
use crate::error::{self, Result, ShellError};
use crate::expand;
use crate::history::{self, History};
use crate::io_adapters::MemWriter;
use crate::lexer::{self, Token};
use crate::parser::{self, ExecutionShape, Redirect, Segment};
use crate::process::{Input, OsBackend, Output, ProcessBackend, RunningProcess, Wiring};
use crate::prompt::PromptTemplate;
use crate::signal::{self, InterruptFlag};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the builtins defined in this crate.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Where a segment's standard output goes.
enum Sink<'a> {
    Terminal(&'a mut dyn Write),
    File(File),
}

/// The dispatch loop: turns command lines into builtin calls and processes.
///
/// The interpreter owns the session state ([`Environment`], which holds the
/// history buffer and alias table), the builtin registry and the process
/// backend. One line is fully executed before the next is read.
pub struct Interpreter {
    env: Environment,
    builtins: Vec<Box<dyn CommandFactory>>,
    backend: Box<dyn ProcessBackend>,
    interrupt: InterruptFlag,
    prompt: PromptTemplate,
}

impl Interpreter {
    /// Build a session from `config`: history is loaded from the configured file
    /// and aliases are seeded from the `[alias]` table.
    pub fn new(config: &Config) -> Self {
        let home = config::home_dir();
        let histfile = config.histfile_in(home.as_deref());
        let history = History::load(&histfile, config.histsize).unwrap_or_else(|err| {
            tracing::warn!(path = %histfile.display(), error = %err, "could not read history");
            error::report(&err);
            History::preserving(&histfile, config.histsize)
        });
        Self {
            env: Environment::new(history, config.alias.clone()),
            builtins: default_builtins(),
            backend: Box::new(OsBackend),
            interrupt: Arc::new(AtomicBool::new(false)),
            prompt: PromptTemplate::new(config.prompt.clone())
                .with_color(config.style.get("prompt").map(String::as_str)),
        }
    }

    /// Swap the process backend, e.g. for an in-memory one.
    pub fn with_backend(mut self, backend: Box<dyn ProcessBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Share an interrupt flag with a signal handler.
    pub fn with_interrupt_flag(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Make `dir` the working directory of the session and of the process.
    pub fn enter_directory(&mut self, dir: &Path) -> Result<()> {
        let failed = |source| ShellError::DirectoryChangeFailed {
            path: dir.to_path_buf(),
            source,
        };
        let canonical = fs::canonicalize(dir).map_err(failed)?;
        std::env::set_current_dir(&canonical).map_err(failed)?;
        self.env.current_dir = canonical;
        Ok(())
    }

    pub fn render_prompt(&self) -> String {
        self.prompt.render(&self.env)
    }

    /// Run one command line and return its exit status.
    ///
    /// Errors are reported on stderr and turned into a status; `$?` sees the
    /// result on the next line. Builtin output goes to `terminal`, spawned
    /// commands inherit the real standard streams.
    pub fn execute_line(&mut self, line: &str, terminal: &mut dyn Write) -> ExitCode {
        signal::clear_interrupted(&self.interrupt);
        if line.trim().is_empty() {
            return self.env.last_status;
        }
        let status = match self.dispatch(line, terminal) {
            Ok(status) => status,
            Err(err) => {
                error::report(&err);
                if matches!(err, ShellError::Interrupted) {
                    self.env.should_exit = true;
                }
                err.exit_status()
            }
        };
        let _ = terminal.flush();
        self.env.last_status = status;
        status
    }

    fn dispatch(&mut self, line: &str, terminal: &mut dyn Write) -> Result<ExitCode> {
        let trimmed = line.trim();
        if history::is_bang_line(trimmed) {
            return self.dispatch_bang(line, terminal);
        }
        self.env.history.append(line);

        let tokens = self.tokenize(trimmed)?;
        let Some(first) = tokens.first() else {
            return Ok(0);
        };
        let has_operator = tokens.iter().any(|t| matches!(t, Token::Op(_)));
        let shape = if !has_operator && self.is_builtin(&first.render(None)) {
            ExecutionShape::Simple {
                command: tokens,
                glob: false,
            }
        } else {
            parser::resolve(tokens)?
        };
        tracing::debug!(shape = shape.kind(), "resolved");
        self.execute_shape(shape, terminal)
    }

    /// Expand a history reference, echo it, run it as a single command, then
    /// record the expansion in place of the literal line.
    fn dispatch_bang(&mut self, line: &str, terminal: &mut dyn Write) -> Result<ExitCode> {
        let trimmed = line.trim();
        let expanded = self
            .env
            .history
            .expand_bang_line(trimmed)?
            .unwrap_or_else(|| trimmed.to_string());
        let recorded = self.env.history.append(line);
        writeln!(terminal, "{expanded}")?;
        terminal.flush()?;

        let status = self.tokenize(&expanded).and_then(|tokens| {
            self.execute_shape(
                ExecutionShape::Simple {
                    command: tokens,
                    glob: false,
                },
                terminal,
            )
        });
        if recorded {
            self.env.history.replace_last(&expanded);
        }
        status
    }

    fn tokenize(&self, line: &str) -> Result<Vec<Token>> {
        let tokens = lexer::split_into_tokens(line)?;
        expand::expand_alias(tokens, &self.env.aliases)
    }

    fn is_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|f| f.handles(name))
    }

    fn create_builtin(&self, argv: &[String]) -> Option<Box<dyn ExecutableCommand>> {
        let (name, args) = argv.split_first()?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.builtins
            .iter()
            .find_map(|factory| factory.try_create(name, &args))
    }

    fn execute_shape(&mut self, shape: ExecutionShape, terminal: &mut dyn Write) -> Result<ExitCode> {
        match shape {
            ExecutionShape::Simple { command, glob } => {
                if glob {
                    tracing::debug!(command = %lexer::join_tokens(&command), "glob detected");
                    writeln!(terminal, "minish: glob pattern passed through unexpanded")?;
                }
                self.run_segment(&command, Sink::Terminal(terminal))
            }
            ExecutionShape::Pipeline(segments) => self.run_pipeline(&segments, terminal),
            ExecutionShape::AndChain(segments) => self.run_chain(&segments, terminal, true),
            ExecutionShape::OrChain(segments) => self.run_chain(&segments, terminal, false),
            ExecutionShape::AppendRedirect(redirect) | ExecutionShape::ClobberRedirect(redirect) => {
                self.run_redirect(redirect)
            }
        }
    }

    /// Run segments left to right while each status matches `continue_on_success`.
    fn run_chain(
        &mut self,
        segments: &[Segment],
        terminal: &mut dyn Write,
        continue_on_success: bool,
    ) -> Result<ExitCode> {
        let mut status = 0;
        for segment in segments {
            if signal::is_interrupted(&self.interrupt) {
                return Err(ShellError::Interrupted);
            }
            status = match self.run_segment(segment, Sink::Terminal(&mut *terminal)) {
                Err(err @ ShellError::CommandNotFound { .. }) => {
                    error::report(&err);
                    err.exit_status()
                }
                other => other?,
            };
            if (status == 0) != continue_on_success {
                break;
            }
        }
        Ok(status)
    }

    fn run_redirect(&mut self, redirect: Redirect) -> Result<ExitCode> {
        let path = self.env.current_dir.join(&redirect.target);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(redirect.append)
            .truncate(!redirect.append)
            .open(&path)
            .map_err(|source| ShellError::RedirectTargetUnwritable {
                path: redirect.target.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), append = redirect.append, "redirecting stdout");
        self.run_segment(&redirect.command, Sink::File(file))
    }

    /// Run one command, in-process when it is a builtin.
    fn run_segment(&mut self, tokens: &[Token], sink: Sink<'_>) -> Result<ExitCode> {
        let argv = expand::argv(tokens, &self.env);
        if argv.is_empty() {
            return Ok(0);
        }
        if let Some(cmd) = self.create_builtin(&argv) {
            return match sink {
                Sink::Terminal(terminal) => {
                    let status = cmd.execute(terminal, &mut self.env);
                    terminal.flush()?;
                    status
                }
                Sink::File(mut file) => cmd.execute(&mut file, &mut self.env),
            };
        }

        let stdout = match sink {
            Sink::Terminal(terminal) => {
                terminal.flush()?;
                Output::Inherit
            }
            Sink::File(file) => Output::File(file),
        };
        let child = self
            .backend
            .spawn(&argv, &self.env, Wiring::inherit().stdout(stdout))?;
        let mut children = vec![child];
        self.wait_all(&mut children)
            .map(|codes| codes.last().copied().unwrap_or(0))
    }

    /// Start every stage, connecting each stdout to the next stdin, and wait for all.
    ///
    /// Builtin stages run in-process on a copy of the environment; their output
    /// becomes the next stage's input. The status is the last stage's.
    fn run_pipeline(&mut self, segments: &[Segment], terminal: &mut dyn Write) -> Result<ExitCode> {
        let mut children: Vec<Box<dyn RunningProcess>> = Vec::new();
        let mut input = Input::Inherit;
        let mut builtin_status = None;

        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            let argv = expand::argv(segment, &self.env);
            let stdin = std::mem::replace(&mut input, Input::Inherit);

            if let Some(cmd) = self.create_builtin(&argv) {
                drop(stdin);
                let mut stage_env = self.env.clone();
                let status = if is_last {
                    let status = cmd.execute(terminal, &mut stage_env);
                    terminal.flush()?;
                    status?
                } else {
                    let mut captured = MemWriter::new();
                    let status = cmd.execute(&mut captured, &mut stage_env)?;
                    input = Input::Bytes(captured.take());
                    status
                };
                builtin_status = Some(status);
                continue;
            }

            let stdout = if is_last {
                terminal.flush()?;
                Output::Inherit
            } else {
                Output::Piped
            };
            let wiring = Wiring::inherit().stdin(stdin).stdout(stdout);
            match self.backend.spawn(&argv, &self.env, wiring) {
                Ok(mut child) => {
                    if !is_last {
                        input = child
                            .take_stdout()
                            .map_or(Input::Bytes(Vec::new()), Input::Pipe);
                    }
                    children.push(child);
                    builtin_status = None;
                }
                Err(err) => {
                    terminate_all(&mut children);
                    return Err(ShellError::PipelineSpawnFailure {
                        stage: argv.first().cloned().unwrap_or_default(),
                        source: Box::new(err),
                    });
                }
            }
        }

        let codes = self.wait_all(&mut children)?;
        Ok(builtin_status.or(codes.last().copied()).unwrap_or(0))
    }

    /// Wait for every child, terminating all of them if the user interrupts.
    fn wait_all(&self, children: &mut [Box<dyn RunningProcess>]) -> Result<Vec<ExitCode>> {
        let mut codes: Vec<Option<ExitCode>> = vec![None; children.len()];
        loop {
            if signal::is_interrupted(&self.interrupt) {
                tracing::debug!(children = children.len(), "interrupted, terminating");
                terminate_all(children);
                return Err(ShellError::Interrupted);
            }
            let mut failure = None;
            for (code, child) in codes.iter_mut().zip(children.iter_mut()) {
                if code.is_none() {
                    match child.try_wait() {
                        Ok(status) => *code = status,
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
            if let Some(e) = failure {
                terminate_all(children);
                return Err(e.into());
            }
            if let Some(done) = codes.iter().copied().collect::<Option<Vec<_>>>() {
                return Ok(done);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Read-Eval-Print loop over a rustyline editor seeded with the session history.
    ///
    /// Ends on `quit`/`exit`, end of input, or Ctrl-C at the prompt; history is
    /// flushed on every way out.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        for (_, line) in self.env.history.list(0) {
            let _ = rl.add_history_entry(line);
        }
        let mut stdout = std::io::stdout();

        while !self.env.should_exit {
            let prompt = self.render_prompt();
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.starts_with(' ') && !line.trim().is_empty() {
                        if let Err(e) = rl.add_history_entry(line.as_str()) {
                            tracing::warn!("Failed to add history entry: {}", e);
                        }
                    }
                    self.execute_line(&line, &mut stdout);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    break;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    self.shutdown();
                    return Err(err.into());
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Persist the history buffer. Failures are logged, never fatal.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.env.history.flush() {
            tracing::warn!(
                path = %self.env.history.path().display(),
                error = %err,
                "failed to save history"
            );
            error::report(&err);
        }
    }
}

fn terminate_all(children: &mut [Box<dyn RunningProcess>]) {
    for child in children {
        if let Err(e) = child.terminate() {
            tracing::warn!(pid = child.id(), error = %e, "failed to terminate child");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeBackend;
    use crate::test_support::{lock_current_dir, make_unique_temp_dir};
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::sync::atomic::Ordering;

    struct Harness {
        sh: Interpreter,
        term: MemWriter,
        screen: Rc<RefCell<Vec<u8>>>,
        spawned: Rc<RefCell<Vec<Vec<String>>>>,
        terminated: Rc<RefCell<Vec<String>>>,
        dir: PathBuf,
    }

    impl Harness {
        fn new(tag: &str) -> Self {
            Self::with(tag, |_| {})
        }

        fn with(tag: &str, setup: impl FnOnce(&mut FakeBackend)) -> Self {
            let dir = make_unique_temp_dir(tag);
            let config = Config {
                histfile: dir.join("history"),
                histsize: 50,
                ..Config::default()
            };
            let (term, screen) = MemWriter::with_handle();
            let mut backend = FakeBackend::standard(screen.clone());
            setup(&mut backend);
            let spawned = backend.spawned.clone();
            let terminated = backend.terminated.clone();
            let mut sh = Interpreter::new(&config).with_backend(Box::new(backend));
            sh.env_mut().current_dir = dir.clone();
            Self {
                sh,
                term,
                screen,
                spawned,
                terminated,
                dir,
            }
        }

        fn run(&mut self, line: &str) -> ExitCode {
            self.sh.execute_line(line, &mut self.term)
        }

        /// Everything printed so far, cleared afterwards.
        fn output(&mut self) -> String {
            String::from_utf8(self.term.take()).unwrap()
        }

        fn history(&self) -> Vec<String> {
            self.sh
                .env()
                .history
                .list(0)
                .map(|(_, l)| l.to_string())
                .collect()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn simple_external_and_builtin() {
        let mut h = Harness::new("simple");
        assert_eq!(h.run("echo hello   world"), 0);
        assert_eq!(h.output(), "hello world\n");
        assert!(h.spawned.borrow().is_empty());

        assert_eq!(h.run("false"), 1);
        assert_eq!(h.sh.env().last_status, 1);
        assert_eq!(h.run("echo $?"), 0);
        assert_eq!(h.output(), "1\n");
    }

    #[test]
    fn missing_command_is_127() {
        let mut h = Harness::new("missing");
        assert_eq!(h.run("definitely-not-here"), 127);
        assert_eq!(h.run("echo $?"), 0);
        assert_eq!(h.output(), "127\n");
    }

    #[test]
    fn pipeline_status_is_last_stage() {
        let mut h = Harness::new("pipe_status");
        assert_eq!(h.run("false | true"), 0);
        assert_eq!(h.run("true | false"), 1);
        assert_eq!(h.run("upper | status 7"), 7);
    }

    #[test]
    fn pipeline_connects_stages() {
        let mut h = Harness::new("pipe_data");
        assert_eq!(h.run("echo one two | cat | upper"), 0);
        assert_eq!(h.output(), "ONE TWO\n");
    }

    #[test]
    fn pipeline_spawn_failure_aborts() {
        let mut h = Harness::new("pipe_fail");
        assert_eq!(h.run("cat | nope | upper"), 127);
        let spawned = h.spawned.borrow();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0], vec!["cat"]);
    }

    #[test]
    fn builtin_at_end_of_pipeline_does_not_touch_session() {
        let mut h = Harness::new("pipe_builtin");
        assert_eq!(h.run("true | alias x=y"), 0);
        assert!(h.sh.env().aliases.is_empty());
    }

    #[test]
    fn and_chain_short_circuits() {
        let mut h = Harness::new("and");
        assert_eq!(h.run("false && echo hi"), 1);
        assert_eq!(h.output(), "");

        assert_eq!(h.run("true && echo hi && status 3 && echo no"), 3);
        assert_eq!(h.output(), "hi\n");
    }

    #[test]
    fn or_chain_short_circuits() {
        let mut h = Harness::new("or");
        assert_eq!(h.run("true || echo hi"), 0);
        assert_eq!(h.output(), "");

        assert_eq!(h.run("false || status 4"), 4);
        assert_eq!(h.run("false || nope || echo rescued"), 0);
        assert_eq!(h.output(), "rescued\n");
        assert_eq!(h.run("false || nope"), 127);
    }

    #[test]
    fn or_binds_looser_than_pipe() {
        let mut h = Harness::new("precedence");
        assert_eq!(h.run("false || echo a | b"), 0);
        assert_eq!(h.output(), "a | b\n");
    }

    #[test]
    fn redirects_append_and_clobber() {
        let mut h = Harness::new("redirect");
        let target = h.dir.join("out.txt");

        h.run("echo hi >> out.txt");
        h.run("echo hi >> out.txt");
        assert_eq!(fs::read_to_string(&target).unwrap(), "hi\nhi\n");

        h.run("echo hi > out.txt");
        h.run("echo hi > out.txt");
        assert_eq!(fs::read_to_string(&target).unwrap(), "hi\n");
        assert_eq!(h.output(), "");
    }

    #[test]
    fn external_redirect_writes_file() {
        let mut h = Harness::new("redirect_ext");
        assert_eq!(h.run("upper > shout.txt"), 0);
        assert_eq!(h.run("status 5 > status.txt"), 5);
        assert!(h.dir.join("shout.txt").exists());
        assert_eq!(h.screen.borrow().len(), 0);
    }

    #[test]
    fn unwritable_redirect_does_not_spawn() {
        let mut h = Harness::new("redirect_bad");
        assert_eq!(h.run("true > missing/dir/out.txt"), 1);
        assert!(h.spawned.borrow().is_empty());
    }

    #[test]
    fn redirect_without_target_is_syntax_error() {
        let mut h = Harness::new("redirect_syntax");
        assert_eq!(h.run("echo hi >"), 2);
    }

    #[test]
    fn unterminated_quote_is_reported() {
        let mut h = Harness::new("quote");
        assert_eq!(h.run("echo 'oops"), 2);
        assert!(!h.sh.should_exit());
    }

    #[test]
    fn quoted_operators_are_arguments() {
        let mut h = Harness::new("quoted_ops");
        assert_eq!(h.run("echo 'a | b' \"c && d\" x\\>y"), 0);
        assert_eq!(h.output(), "a | b c && d x>y\n");
    }

    #[test]
    fn glob_is_passed_through() {
        let mut h = Harness::new("glob");
        assert_eq!(h.run("cat *.rs"), 0);
        assert_eq!(h.spawned.borrow()[0], vec!["cat", "*.rs"]);
        assert_eq!(h.output(), "minish: glob pattern passed through unexpanded\n");
    }

    #[test]
    fn variables_expand_only_for_echo() {
        let mut h = Harness::new("vars");
        h.sh.env_mut().set_var("GREETING", "hi");
        assert_eq!(h.run("echo $GREETING ${GREETING}!"), 0);
        assert_eq!(h.output(), "hi hi!\n");
        h.run("cat $GREETING");
        assert_eq!(h.spawned.borrow()[0], vec!["cat", "$GREETING"]);
    }

    #[test]
    fn echo_expands_shell_pid() {
        let mut h = Harness::new("pid");
        assert_eq!(h.run("echo $$"), 0);
        assert_eq!(h.output(), format!("{}\n", std::process::id()));
    }

    #[test]
    fn failed_wait_terminates_every_stage() {
        let mut h = Harness::with("wait_fail", |backend| backend.unwaitable("stuck"));
        assert_eq!(h.run("cat | stuck"), 1);
        assert_eq!(*h.terminated.borrow(), vec!["cat", "stuck"]);
    }

    #[test]
    fn history_records_lines() {
        let mut h = Harness::new("history");
        h.run("echo one");
        h.run(" echo secret");
        h.run("false");
        h.run("   ");
        assert_eq!(h.history(), vec!["echo one", "false"]);
    }

    #[test]
    fn bang_runs_and_records_expansion() {
        let mut h = Harness::new("bang");
        h.run("echo hi");
        h.output();

        assert_eq!(h.run("!!"), 0);
        assert_eq!(h.output(), "echo hi\nhi\n");
        assert_eq!(h.history(), vec!["echo hi", "echo hi"]);

        h.run("false");
        assert_eq!(h.run("!1"), 0);
        assert_eq!(h.output(), "echo hi\nhi\n");
        assert_eq!(h.run("!fa"), 1);
        assert_eq!(h.history().last().map(String::as_str), Some("false"));
    }

    #[test]
    fn bang_runs_as_single_command() {
        let mut h = Harness::new("bang_simple");
        h.sh.env_mut().history.append("echo a | upper");
        assert_eq!(h.run("!!"), 0);
        assert_eq!(h.output(), "echo a | upper\na | upper\n");
    }

    #[test]
    fn embedded_bang_bang() {
        let mut h = Harness::new("bang_embedded");
        h.run("upper");
        assert_eq!(h.run("echo !!"), 0);
        assert_eq!(h.output(), "echo upper\nupper\n");
        assert_eq!(h.history(), vec!["upper", "echo upper"]);
    }

    #[test]
    fn unknown_bang_is_not_recorded() {
        let mut h = Harness::new("bang_missing");
        h.run("true");
        assert_eq!(h.run("!nothing"), 1);
        assert_eq!(h.history(), vec!["true"]);
    }

    #[test]
    fn alias_lifecycle() {
        let mut h = Harness::new("alias");
        assert_eq!(h.run("alias shout='echo hey | upper'"), 0);
        assert_eq!(h.run("shout"), 0);
        assert_eq!(h.output(), "HEY\n");

        assert_eq!(h.run("alias"), 0);
        assert_eq!(h.output(), "alias shout=echo hey | upper\n");

        assert_eq!(h.run("unalias shout"), 0);
        assert_eq!(h.run("shout"), 127);
    }

    #[test]
    fn history_builtin_sees_current_line() {
        let mut h = Harness::new("history_builtin");
        h.run("true");
        assert_eq!(h.run("history"), 0);
        assert_eq!(h.output(), "1  true\n2  history\n");
        assert_eq!(h.run("history -d 9"), 1);
    }

    #[test]
    fn builtin_redirect_of_history() {
        let mut h = Harness::new("history_redirect");
        h.run("true");
        assert_eq!(h.run("history > list.txt"), 0);
        assert_eq!(
            fs::read_to_string(h.dir.join("list.txt")).unwrap(),
            "1  true\n2  history > list.txt\n"
        );
    }

    #[test]
    fn quit_flushes_on_shutdown() {
        let mut h = Harness::new("quit");
        h.run("echo saved");
        assert_eq!(h.run("quit"), 0);
        assert!(h.sh.should_exit());
        h.sh.shutdown();
        assert_eq!(
            fs::read_to_string(h.dir.join("history")).unwrap(),
            "echo saved\nquit\n"
        );
    }

    #[test]
    fn interrupt_stops_chain_and_ends_session() {
        let flag: InterruptFlag = Arc::new(AtomicBool::new(false));
        let raised = flag.clone();
        let mut h = Harness::with("interrupt", move |backend| {
            backend.program("sleep", move |_, _| {
                raised.store(true, Ordering::SeqCst);
                (Vec::new(), 0)
            });
        });
        h.sh.interrupt = flag;

        assert_eq!(h.run("sleep 10 && echo after"), 130);
        assert_eq!(h.output(), "");
        assert!(h.sh.should_exit());
        assert_eq!(h.spawned.borrow().len(), 1);
    }

    #[test]
    fn cd_changes_directory_for_children() {
        let _lock = lock_current_dir();
        let orig = std::env::current_dir().unwrap();
        let mut h = Harness::new("cd");
        fs::create_dir_all(h.dir.join("inner")).unwrap();

        assert_eq!(h.run("cd inner"), 0);
        assert_eq!(
            h.sh.env().current_dir,
            fs::canonicalize(h.dir.join("inner")).unwrap()
        );
        assert_eq!(h.run("cd does-not-exist"), 0);

        std::env::set_current_dir(orig).unwrap();
    }

    #[test]
    fn enter_directory_moves_session_and_process() {
        let _lock = lock_current_dir();
        let orig = std::env::current_dir().unwrap();
        let mut h = Harness::new("enter");

        h.sh.enter_directory(&h.dir).unwrap();
        let canonical = fs::canonicalize(&h.dir).unwrap();
        assert_eq!(h.sh.env().current_dir, canonical);
        assert_eq!(std::env::current_dir().unwrap(), canonical);
        assert!(matches!(
            h.sh.enter_directory(&h.dir.join("absent")),
            Err(ShellError::DirectoryChangeFailed { .. })
        ));

        std::env::set_current_dir(orig).unwrap();
    }

    #[test]
    fn undecodable_history_survives_session() {
        let dir = make_unique_temp_dir("history_bytes");
        let histfile = dir.join("history");
        fs::write(&histfile, b"ls -l\ngit status\necho caf\xe9\n").unwrap();
        let config = Config {
            histfile: histfile.clone(),
            ..Config::default()
        };
        let mut term = MemWriter::new();
        let mut sh = Interpreter::new(&config)
            .with_backend(Box::new(FakeBackend::standard(Rc::new(RefCell::new(Vec::new())))));
        assert_eq!(sh.env().history.len(), 3);

        sh.execute_line("true", &mut term);
        sh.shutdown();
        let saved = fs::read_to_string(&histfile).unwrap();
        assert!(saved.starts_with("ls -l\ngit status\n"));
        assert!(saved.ends_with("\ntrue\n"));
        let _ = fs::remove_dir_all(&dir);
    }
}
