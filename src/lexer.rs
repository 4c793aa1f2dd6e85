//! Lexical analysis (tokenization) of a command line.
//!
//! The lexer is a small finite state machine. Quotes and backslashes suppress
//! word splitting and operator recognition, so a `|` inside `'a|b'` stays part of
//! the word while an unquoted `|` becomes an operator token.

use crate::env::Environment;
use crate::error::{Result, ShellError};

/// A part of a word: unquoted text, quoted text, or a `$` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Unquoted text. Glob characters only count in this part.
    Literal(String),
    /// Text from `'...'`, `"..."` or a backslash escape, taken verbatim.
    Quoted(String),
    /// `$NAME`, `${NAME}`, `$?` or `$$`.
    Param { name: String, braced: bool },
}

/// Control operators recognized outside of quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `|`
    Pipe,
    /// `||`
    Or,
    /// `&&`
    And,
    /// `>>`
    Append,
    /// `>`
    Clobber,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Pipe => "|",
            Operator::Or => "||",
            Operator::And => "&&",
            Operator::Append => ">>",
            Operator::Clobber => ">",
        }
    }
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word token, which may be composed of multiple parts (`WordPart`).
    Word(Vec<WordPart>),
    /// An operator token.
    Op(Operator),
}

impl Token {
    /// A plain unquoted word.
    pub fn word(text: impl Into<String>) -> Self {
        Token::Word(vec![WordPart::Literal(text.into())])
    }

    pub fn is_op(&self, op: Operator) -> bool {
        matches!(self, Token::Op(o) if *o == op)
    }

    /// The word's text if it is made only of unquoted literal parts.
    pub fn as_literal(&self) -> Option<String> {
        match self {
            Token::Word(parts) => parts
                .iter()
                .map(|p| match p {
                    WordPart::Literal(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<Option<String>>(),
            Token::Op(_) => None,
        }
    }

    /// Render the token as a single argument.
    ///
    /// With `env`, parameters are substituted; without it they are passed
    /// through verbatim. Operators render as their literal text.
    pub fn render(&self, env: Option<&Environment>) -> String {
        match self {
            Token::Op(op) => op.as_str().to_string(),
            Token::Word(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        WordPart::Literal(s) | WordPart::Quoted(s) => out.push_str(s),
                        WordPart::Param { name, braced } => match env {
                            Some(env) => out.push_str(&env.expand_param(name)),
                            None => push_param(&mut out, name, *braced),
                        },
                    }
                }
                out
            }
        }
    }

    /// Shell source text that lexes back to an equivalent token.
    pub fn to_shell_text(&self) -> String {
        match self {
            Token::Op(op) => op.as_str().to_string(),
            Token::Word(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        WordPart::Literal(s) => out.push_str(s),
                        WordPart::Quoted(s) => {
                            out.push('\'');
                            out.push_str(&s.replace('\'', r"'\''"));
                            out.push('\'');
                        }
                        WordPart::Param { name, braced } => push_param(&mut out, name, *braced),
                    }
                }
                out
            }
        }
    }
}

fn push_param(out: &mut String, name: &str, braced: bool) {
    if braced {
        out.push_str("${");
        out.push_str(name);
        out.push('}');
    } else {
        out.push('$');
        out.push_str(name);
    }
}

/// Join tokens back into a command line with single spaces.
pub fn join_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(Token::to_shell_text)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    current_word: Vec<WordPart>,
    buffer: String,
    // parts already in `current_word` when the open double quote started
    quote_mark: usize,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            current_word: Vec::new(),
            buffer: String::new(),
            quote_mark: 0,
        }
    }

    fn make_tokens(&mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                Err(ShellError::UnterminatedQuote)
            }
            _ => {
                self.finish_word(&mut out);
                Ok(out)
            }
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) -> Result<()> {
        if ch.is_whitespace() {
            return Ok(());
        }
        self.state = LexingState::ReadingWord;
        self.handle_word(ch, out)
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) -> Result<()> {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '|' | '>' => {
                self.finish_word(out);
                let op = match (ch, self.peek_char()) {
                    ('|', Some('|')) => Operator::Or,
                    ('|', _) => Operator::Pipe,
                    ('>', Some('>')) => Operator::Append,
                    _ => Operator::Clobber,
                };
                if matches!(op, Operator::Or | Operator::Append) {
                    self.read_char();
                }
                out.push(Token::Op(op));
                self.state = LexingState::Start;
            }
            '&' if self.peek_char() == Some('&') => {
                self.read_char();
                self.finish_word(out);
                out.push(Token::Op(Operator::And));
                self.state = LexingState::Start;
            }
            '\'' => {
                self.flush_literal();
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.flush_literal();
                self.quote_mark = self.current_word.len();
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => {
                self.flush_literal();
                match self.read_char() {
                    Some(escaped) => self.current_word.push(WordPart::Quoted(escaped.to_string())),
                    None => self.buffer.push('\\'),
                }
            }
            '$' => {
                self.flush_literal();
                match self.read_param()? {
                    Some(param) => self.current_word.push(param),
                    None => self.buffer.push('$'),
                }
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => {
                self.current_word
                    .push(WordPart::Quoted(std::mem::take(&mut self.buffer)));
                self.state = LexingState::ReadingWord;
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<()> {
        match ch {
            '"' => {
                if !self.buffer.is_empty() || self.current_word.len() == self.quote_mark {
                    self.current_word
                        .push(WordPart::Quoted(std::mem::take(&mut self.buffer)));
                }
                self.state = LexingState::ReadingWord;
            }
            '\\' => match self.peek_char() {
                Some(c @ ('"' | '\\' | '$' | '`')) => {
                    self.read_char();
                    self.buffer.push(c);
                }
                _ => self.buffer.push('\\'),
            },
            '$' => {
                let param = self.read_param()?;
                match param {
                    Some(param) => {
                        if !self.buffer.is_empty() {
                            self.current_word
                                .push(WordPart::Quoted(std::mem::take(&mut self.buffer)));
                        }
                        self.current_word.push(param);
                    }
                    None => self.buffer.push('$'),
                }
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }

    /// Reads the parameter following a `$`, or `None` when the `$` is literal.
    fn read_param(&mut self) -> Result<Option<WordPart>> {
        match self.peek_char() {
            Some(c @ ('?' | '$')) => {
                self.read_char();
                Ok(Some(WordPart::Param {
                    name: c.to_string(),
                    braced: false,
                }))
            }
            Some('{') => {
                self.read_char();
                let mut name = String::new();
                loop {
                    match self.read_char() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(ShellError::Syntax("unterminated `${`".into())),
                    }
                }
                Ok(Some(WordPart::Param { name, braced: true }))
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek_char() {
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        break;
                    }
                    name.push(c);
                    self.read_char();
                }
                Ok(Some(WordPart::Param {
                    name,
                    braced: false,
                }))
            }
            _ => Ok(None),
        }
    }

    fn flush_literal(&mut self) {
        if !self.buffer.is_empty() {
            self.current_word
                .push(WordPart::Literal(std::mem::take(&mut self.buffer)));
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        self.flush_literal();
        if !self.current_word.is_empty() {
            out.push(Token::Word(std::mem::take(&mut self.current_word)));
        }
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Fails with [`ShellError::UnterminatedQuote`] when a quote is left open.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}
