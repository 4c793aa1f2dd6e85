//! Session configuration read from `~/.minishrc`.
//!
//! The file is TOML. Every key is optional; a missing file means defaults and a
//! malformed one is reported once before falling back to defaults. Unknown
//! top-level keys are logged and skipped.

use crate::env::AliasTable;
use crate::error::{Result, ShellError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const DEFAULT_PROMPT: &str = "[{user}@{host}]$ ";
pub const DEFAULT_HISTSIZE: usize = 500;
const HISTFILE_NAME: &str = ".minish_history";
const CONFIG_NAME: &str = ".minishrc";
const KNOWN_KEYS: [&str; 5] = ["prompt", "histfile", "histsize", "style", "alias"];

/// Colours keyed by prompt element, e.g. `prompt = "#rrggbb"`. Keys the
/// prompt does not use are kept but ignored.
pub type StyleTable = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prompt template, see [`crate::prompt::PromptTemplate`].
    pub prompt: String,
    /// History file. A leading `~` is the home directory.
    pub histfile: PathBuf,
    /// History capacity.
    pub histsize: usize,
    pub style: StyleTable,
    /// Aliases the session starts with.
    pub alias: AliasTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            histfile: PathBuf::from("~").join(HISTFILE_NAME),
            histsize: DEFAULT_HISTSIZE,
            style: StyleTable::new(),
            alias: AliasTable::new(),
        }
    }
}

impl Config {
    /// Parse a configuration document. `path` only labels errors.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let invalid = |e: toml::de::Error| ShellError::Config {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        };
        let mut table: toml::Table = toml::from_str(text).map_err(invalid)?;
        let unknown: Vec<String> = table
            .keys()
            .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
            .cloned()
            .collect();
        for key in unknown {
            tracing::warn!(path = %path.display(), %key, "ignoring unknown configuration key");
            table.remove(&key);
        }
        toml::Value::Table(table).try_into().map_err(invalid)
    }

    /// Read the configuration at `path`; a missing file is the default configuration.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ShellError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Like [`Config::load`], but a broken file is reported and replaced by defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring configuration");
            crate::error::report(&err);
            Self::default()
        })
    }

    /// The history file with `~` expanded against `home`.
    pub fn histfile_in(&self, home: Option<&Path>) -> PathBuf {
        expand_tilde(&self.histfile, home)
    }
}

/// `~/.minishrc` under `home`, or in the current directory when there is no home.
pub fn default_config_path(home: Option<&Path>) -> PathBuf {
    home.map(|h| h.join(CONFIG_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_NAME))
}

/// The user's home directory as the platform reports it.
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf())
}

/// Replace a leading `~` component with `home`.
pub fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = Config::parse("", Path::new("rc")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.prompt, "[{user}@{host}]$ ");
        assert_eq!(config.histsize, 500);
    }

    #[test]
    fn full_document() {
        let text = r##"
prompt = "{cwd} $ "
histfile = "~/.config/minish/history"
histsize = 20

[style]
prompt = "#ff8800"

[alias]
ll = "ls -l"
gs = "git status"
"##;
        let config = Config::parse(text, Path::new("rc")).unwrap();
        assert_eq!(config.prompt, "{cwd} $ ");
        assert_eq!(config.histsize, 20);
        assert_eq!(config.style.get("prompt").map(String::as_str), Some("#ff8800"));
        assert_eq!(config.alias.get("ll").map(String::as_str), Some("ls -l"));
        assert_eq!(
            config.histfile_in(Some(Path::new("/home/u"))),
            PathBuf::from("/home/u/.config/minish/history")
        );
    }

    #[test]
    fn malformed_document_is_config_error() {
        let err = Config::parse("histsize = \"lots\"", Path::new("/x/rc")).unwrap_err();
        assert!(matches!(err, ShellError::Config { .. }));
        assert!(err.to_string().starts_with("config /x/rc:"));
        assert!(Config::parse("histsize = [", Path::new("rc")).is_err());
    }

    #[test]
    fn unknown_keys_do_not_discard_the_file() {
        let text = r##"
histsize = 20
colour = 1

[style]
prompt = "#ff8800"
username = "#00ff00"

[alias]
ll = "ls -l"
"##;
        let config = Config::parse(text, Path::new("rc")).unwrap();
        assert_eq!(config.histsize, 20);
        assert_eq!(config.alias.get("ll").map(String::as_str), Some("ls -l"));
        assert_eq!(config.style.get("username").map(String::as_str), Some("#00ff00"));
        assert_eq!(config.style.get("prompt").map(String::as_str), Some("#ff8800"));
    }

    #[test]
    fn missing_file_is_default() {
        let path = std::env::temp_dir().join(format!("minishrc_missing_{}", std::process::id()));
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        assert_eq!(Config::load_or_default(&path), Config::default());
    }

    #[test]
    fn tilde_expansion() {
        let home = Path::new("/home/u");
        assert_eq!(
            expand_tilde(Path::new("~/.minish_history"), Some(home)),
            PathBuf::from("/home/u/.minish_history")
        );
        assert_eq!(
            expand_tilde(Path::new("/var/h"), Some(home)),
            PathBuf::from("/var/h")
        );
        assert_eq!(
            expand_tilde(Path::new("~/h"), None),
            PathBuf::from("~/h")
        );
        assert_eq!(default_config_path(Some(home)), PathBuf::from("/home/u/.minishrc"));
    }
}
