//! Operator resolution: classify a token sequence into one execution shape.
//!
//! Operators are not nested. The first matching rule wins, in this order:
//! glob, `||`, `|`, `&&`, `>>`, `>`, plain command. Operators of a lower rank
//! that land inside a segment stay in it and reach the command as literal words.

use crate::error::{Result, ShellError};
use crate::expand;
use crate::lexer::{Operator, Token};
use std::path::PathBuf;

/// The token sequence of one sub-command.
pub type Segment = Vec<Token>;

/// Output redirection of a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub command: Segment,
    pub target: PathBuf,
    /// `>>` when true, `>` otherwise.
    pub append: bool,
}

/// The resolved operator structure of one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionShape {
    /// One command. `glob` marks lines carrying an unquoted wildcard.
    Simple { command: Segment, glob: bool },
    Pipeline(Vec<Segment>),
    AndChain(Vec<Segment>),
    OrChain(Vec<Segment>),
    AppendRedirect(Redirect),
    ClobberRedirect(Redirect),
}

impl ExecutionShape {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionShape::Simple { glob: true, .. } => "glob",
            ExecutionShape::Simple { .. } => "simple",
            ExecutionShape::Pipeline(_) => "pipeline",
            ExecutionShape::AndChain(_) => "and-chain",
            ExecutionShape::OrChain(_) => "or-chain",
            ExecutionShape::AppendRedirect(_) => "append-redirect",
            ExecutionShape::ClobberRedirect(_) => "clobber-redirect",
        }
    }
}

/// Resolve `tokens` into exactly one [`ExecutionShape`].
pub fn resolve(tokens: Vec<Token>) -> Result<ExecutionShape> {
    let has = |op: Operator| tokens.iter().any(|t| t.is_op(op));

    if expand::has_glob(&tokens) {
        return Ok(ExecutionShape::Simple {
            command: tokens,
            glob: true,
        });
    }
    if has(Operator::Or) {
        return Ok(ExecutionShape::OrChain(split_on(tokens, Operator::Or)));
    }
    if has(Operator::Pipe) {
        return Ok(ExecutionShape::Pipeline(split_on(tokens, Operator::Pipe)));
    }
    if has(Operator::And) {
        return Ok(ExecutionShape::AndChain(split_on(tokens, Operator::And)));
    }
    if has(Operator::Append) {
        return split_redirect(tokens, Operator::Append).map(ExecutionShape::AppendRedirect);
    }
    if has(Operator::Clobber) {
        return split_redirect(tokens, Operator::Clobber).map(ExecutionShape::ClobberRedirect);
    }
    Ok(ExecutionShape::Simple {
        command: tokens,
        glob: false,
    })
}

/// Split on every `op`, dropping empty segments.
fn split_on(tokens: Vec<Token>, op: Operator) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        if token.is_op(op) {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
        } else {
            current.push(token);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Split at the first `op`: the word after it is the target, further words
/// are appended to the command.
fn split_redirect(mut tokens: Vec<Token>, op: Operator) -> Result<Redirect> {
    let at = tokens
        .iter()
        .position(|t| t.is_op(op))
        .ok_or_else(|| ShellError::Syntax(format!("missing `{}`", op.as_str())))?;
    let mut rest = tokens.split_off(at + 1).into_iter();
    tokens.pop();

    let target = match rest.next() {
        Some(word @ Token::Word(_)) => PathBuf::from(word.render(None)),
        _ => {
            return Err(ShellError::Syntax(format!(
                "expected a file name after `{}`",
                op.as_str()
            )));
        }
    };
    if tokens.is_empty() {
        return Err(ShellError::Syntax(format!(
            "missing command before `{}`",
            op.as_str()
        )));
    }
    tokens.extend(rest);
    Ok(Redirect {
        command: tokens,
        target,
        append: op == Operator::Append,
    })
}
