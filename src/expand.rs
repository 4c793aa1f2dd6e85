//! Expansion applied to a token sequence before operator resolution.

use crate::env::{AliasTable, Environment};
use crate::error::Result;
use crate::lexer::{self, Token, WordPart};
use regex::Regex;
use std::sync::LazyLock;

static GLOB_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*?\[\]]").expect("static glob regex"));

/// Replace an aliased first word with its expansion, re-tokenized.
///
/// Only one level is applied: the expansion's own first word is not looked up
/// again, so `alias ls='ls -G'` cannot loop.
pub fn expand_alias(tokens: Vec<Token>, aliases: &AliasTable) -> Result<Vec<Token>> {
    let expansion = match tokens.first().and_then(Token::as_literal) {
        Some(first) => match aliases.get(&first) {
            Some(expansion) => expansion,
            None => return Ok(tokens),
        },
        None => return Ok(tokens),
    };
    tracing::debug!(%expansion, "alias expanded");
    let mut expanded = lexer::split_into_tokens(expansion)?;
    expanded.extend(tokens.into_iter().skip(1));
    Ok(expanded)
}

/// Whether any unquoted word part carries a glob character.
pub fn has_glob(tokens: &[Token]) -> bool {
    tokens.iter().any(|token| match token {
        Token::Word(parts) => parts.iter().any(|part| match part {
            WordPart::Literal(text) => GLOB_CHARS.is_match(text),
            _ => false,
        }),
        Token::Op(_) => false,
    })
}

/// Build the argument vector for one sub-command.
///
/// Parameters are only substituted when the command is `echo`; every other
/// command receives `$NAME` verbatim.
pub fn argv(tokens: &[Token], env: &Environment) -> Vec<String> {
    let Some(first) = tokens.first() else {
        return Vec::new();
    };
    let name = first.render(None);
    let vars = (name == "echo").then_some(env);
    std::iter::once(name)
        .chain(tokens[1..].iter().map(|t| t.render(vars)))
        .collect()
}
