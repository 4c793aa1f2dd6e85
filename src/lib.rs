//! A small interactive command interpreter.
//!
//! A line typed at the prompt is tokenized with quote awareness, aliases are
//! expanded, and the line is resolved into exactly one execution shape: a
//! single command, a pipeline, an `&&` or `||` chain, or an output redirect.
//! Builtins (`cd`, `echo`, `history`, `alias`, `unalias`, `quit`) run
//! in-process; everything else is spawned through a [`process::ProcessBackend`].
//!
//! The session keeps a bounded history that is persisted between runs and
//! supports bash-style `!!`, `!n` and `!prefix` recall.
//!
//! The main entry point is [`Interpreter`].

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod expand;
pub mod history;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod parser;
pub mod process;
pub mod prompt;
pub mod signal;

pub use config::Config;
pub use error::ShellError;
pub use interpreter::Interpreter;
