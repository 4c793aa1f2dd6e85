//! Error taxonomy shared by every stage of the dispatch cycle.
//!
//! None of these errors terminate the interpreter on their own: the dispatch
//! loop reports them and carries on with the next prompt. Each variant maps
//! to the exit status the user observes through `$?`.

use crate::command::ExitCode;
use std::path::PathBuf;

/// Everything that can go wrong while resolving or running one command line.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// A single or double quote was opened but never closed.
    #[error("unterminated quote")]
    UnterminatedQuote,

    /// The executable could not be found or could not be started.
    #[error("{name}: command not found")]
    CommandNotFound { name: String },

    /// A stage of a pipeline failed to start, the whole pipeline was aborted.
    #[error("pipeline aborted, `{stage}` failed to start: {source}")]
    PipelineSpawnFailure {
        stage: String,
        #[source]
        source: Box<ShellError>,
    },

    /// The target of `>` or `>>` could not be opened for writing.
    #[error("{}: {source}", .path.display())]
    RedirectTargetUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `history` was called with arguments it does not understand.
    #[error("history: invalid history command `{0}`")]
    InvalidHistoryCommand(String),

    /// A bang-expression did not match anything in the history buffer.
    #[error("{0}: event not found")]
    NoMatchingHistoryEntry(String),

    /// A history index was outside `[1, len]` or the range was reversed.
    #[error("history position out of range: {start}{}", range_suffix(.end))]
    IndexOutOfRange { start: usize, end: Option<usize> },

    /// `cd` could not switch to the requested directory.
    #[error("cd: {}: {source}", .path.display())]
    DirectoryChangeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The line is structurally incomplete, e.g. `ls >` with no target.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The user interrupted a running command.
    #[error("interrupted")]
    Interrupted,

    /// The configuration file exists but could not be understood.
    #[error("config {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Exit status surfaced to `$?` when this error ends a dispatch cycle.
    pub fn exit_status(&self) -> ExitCode {
        match self {
            ShellError::CommandNotFound { .. } => 127,
            ShellError::PipelineSpawnFailure { source, .. } => source.exit_status(),
            ShellError::Syntax(_) | ShellError::UnterminatedQuote => 2,
            ShellError::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Print an error the way the dispatch loop reports it.
pub fn report(err: &ShellError) {
    eprintln!("minish: {err}");
}

fn range_suffix(end: &Option<usize>) -> String {
    end.map(|e| format!("-{e}")).unwrap_or_default()
}

pub type Result<T, E = ShellError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_not_found_maps_to_127() {
        let err = ShellError::CommandNotFound {
            name: "nope".into(),
        };
        assert_eq!(err.exit_status(), 127);
        assert_eq!(err.to_string(), "nope: command not found");
    }

    #[test]
    fn pipeline_failure_inherits_cause_status() {
        let err = ShellError::PipelineSpawnFailure {
            stage: "nope".into(),
            source: Box::new(ShellError::CommandNotFound {
                name: "nope".into(),
            }),
        };
        assert_eq!(err.exit_status(), 127);
    }

    #[test]
    fn index_out_of_range_formats_range() {
        let single = ShellError::IndexOutOfRange {
            start: 9,
            end: None,
        };
        let range = ShellError::IndexOutOfRange {
            start: 4,
            end: Some(2),
        };
        assert_eq!(single.to_string(), "history position out of range: 9");
        assert_eq!(range.to_string(), "history position out of range: 4-2");
        assert_eq!(range.exit_status(), 1);
    }
}
