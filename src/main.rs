use anyhow::{Context, Result};
use argh::FromArgs;
use minish::{Config, Interpreter, config, signal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// minish, a small interactive shell.
struct Args {
    #[argh(option)]
    /// configuration file; defaults to ~/.minishrc.
    config: Option<PathBuf>,

    #[argh(option)]
    /// history file, overriding the configuration.
    histfile: Option<PathBuf>,

    #[argh(option)]
    /// number of history entries to keep, overriding the configuration.
    histsize: Option<usize>,

    #[argh(switch, short = 'V')]
    /// print the version and exit.
    version: bool,
}

fn main() -> ExitCode {
    // verbosity from RUST_LOG, output on stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();
    if args.version {
        println!("minish {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(status) => ExitCode::from(u8::try_from(status & 0xff).unwrap_or(1)),
        Err(e) => {
            eprintln!("minish: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let home = config::home_dir();
    let config_path = args
        .config
        .unwrap_or_else(|| config::default_config_path(home.as_deref()));
    let mut config = Config::load_or_default(&config_path);
    if let Some(histfile) = args.histfile {
        config.histfile = histfile;
    }
    if let Some(histsize) = args.histsize {
        config.histsize = histsize;
    }
    tracing::debug!(?config, path = %config_path.display(), "configuration");

    let interrupt = Arc::new(AtomicBool::new(false));
    signal::install_interrupt_handler(interrupt.clone())
        .context("Failed to install the Ctrl-C handler")?;

    let mut sh = Interpreter::new(&config).with_interrupt_flag(interrupt);
    if let Some(home) = home.as_deref() {
        if let Err(err) = sh.enter_directory(home) {
            minish::error::report(&err);
        }
    }
    println!("minish version {}", env!("CARGO_PKG_VERSION"));
    sh.repl().context("Line editor failed")?;
    Ok(sh.env().last_status)
}
