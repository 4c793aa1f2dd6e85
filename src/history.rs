//! Bounded command history with FIFO eviction and a plain-text backing file.
//!
//! Entries are numbered from 1 for display, deletion and `!n` lookups. The
//! persisted file holds one command per line with no escaping; truncation to
//! capacity happens when loading, never on disk.

use crate::error::{Result, ShellError};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    path: PathBuf,
    // the file could not be read; flushing appends instead of overwriting it
    append_on_flush: bool,
}

impl History {
    /// An empty buffer that persists to `path`.
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            path: path.into(),
            append_on_flush: false,
        }
    }

    /// An empty buffer for a history file that exists but could not be read.
    ///
    /// [`History::flush`] appends to the file so its contents survive the session.
    pub fn preserving(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            append_on_flush: true,
            ..Self::new(path, capacity)
        }
    }

    /// Read the persisted history, keeping only the newest `capacity` lines.
    ///
    /// A missing file is an empty history, not an error. Bytes that are not
    /// valid UTF-8 are replaced rather than rejected.
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let mut history = Self::new(path, capacity);
        let bytes = match fs::read(&history.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %history.path.display(), "no history file yet");
                return Ok(history);
            }
            Err(e) => return Err(e.into()),
        };
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let skip = lines.len().saturating_sub(capacity);
        history
            .entries
            .extend(lines[skip..].iter().map(|l| l.to_string()));
        tracing::debug!(
            loaded = history.entries.len(),
            dropped = skip,
            "history loaded"
        );
        Ok(history)
    }

    /// Append a command, evicting the oldest entry when full.
    ///
    /// Lines starting with a space and blank lines are not recorded; anything
    /// else is kept exactly as typed. Returns whether the line was stored.
    pub fn append(&mut self, line: &str) -> bool {
        if line.starts_with(' ') || line.trim().is_empty() || self.capacity == 0 {
            return false;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
        true
    }

    /// Write every entry to `path`, truncating it or appending to it.
    pub fn save(&self, path: &Path, append_mode: bool) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append_mode)
            .truncate(!append_mode)
            .open(path)?;
        let mut out = BufWriter::new(file);
        for line in &self.entries {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write the buffer to the session's history file, overwriting it unless
    /// the buffer was created with [`History::preserving`].
    pub fn flush(&self) -> Result<()> {
        self.save(&self.path, self.append_on_flush)
    }

    /// `(index, line)` pairs, oldest first.
    ///
    /// `count == 0` yields everything, otherwise the newest `count` entries with
    /// their absolute indices. The iterator is cheap to clone and restart.
    pub fn list(&self, count: usize) -> impl Iterator<Item = (usize, &str)> + Clone + '_ {
        let skip = match count {
            0 => 0,
            n => self.entries.len().saturating_sub(n),
        };
        self.entries
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, line)| (i + 1, line.as_str()))
    }

    /// Remove the entry at `start`, or the inclusive span `start..=end`.
    pub fn delete(&mut self, start: usize, end: Option<usize>) -> Result<()> {
        let last = end.unwrap_or(start);
        if start == 0 || last > self.entries.len() || start > last {
            return Err(ShellError::IndexOutOfRange { start, end });
        }
        self.entries.drain(start - 1..last);
        Ok(())
    }

    /// Empty the buffer. The persisted file is left alone.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Resolve a single bang-expression: `!!`, `!n` or `!prefix`.
    pub fn resolve_bang(&self, expression: &str) -> Result<String> {
        let not_found = || ShellError::NoMatchingHistoryEntry(expression.to_string());
        let body = expression.strip_prefix('!').ok_or_else(not_found)?;
        if body.is_empty() {
            return Err(not_found());
        }
        let found = if body == "!" {
            self.entries.back()
        } else if let Ok(n) = body.parse::<usize>() {
            n.checked_sub(1).and_then(|i| self.entries.get(i))
        } else {
            self.entries.iter().rev().find(|line| line.starts_with(body))
        };
        found.cloned().ok_or_else(not_found)
    }

    /// Expand history references in a whole line.
    ///
    /// A line starting with `!word` has that first word resolved; any `!!` in
    /// the remainder is replaced by the previous command. Returns `None` when
    /// the line contains no history reference.
    pub fn expand_bang_line(&self, line: &str) -> Result<Option<String>> {
        if !is_bang_line(line) {
            return Ok(None);
        }
        let (head, rest) = if line.starts_with('!') {
            let split = line.find(char::is_whitespace).unwrap_or(line.len());
            let (expr, rest) = line.split_at(split);
            (self.resolve_bang(expr)?, rest)
        } else {
            (String::new(), line)
        };
        let rest = if rest.contains("!!") {
            rest.replace("!!", &self.resolve_bang("!!")?)
        } else {
            rest.to_string()
        };
        Ok(Some(head + &rest))
    }

    /// Replace the newest entry, used once a bang line has been expanded.
    pub fn replace_last(&mut self, line: &str) {
        if let Some(last) = self.entries.back_mut() {
            *last = line.to_string();
        }
    }

    /// The entry at 1-based `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether `line` contains a history reference.
///
/// A lone `!` or `! cmd` (negation in real shells) and `!=` are not references.
pub fn is_bang_line(line: &str) -> bool {
    let leading = line
        .strip_prefix('!')
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| !c.is_whitespace() && c != '=');
    leading || line.contains("!!")
}
