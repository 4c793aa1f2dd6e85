//! Prompt rendering.
//!
//! Templates are plain text with a closed set of placeholders: `{cwd}`,
//! `{user}`, `{host}` and `{status}`. `{{` and `}}` produce literal braces and
//! an unknown placeholder is copied through unchanged. Nothing in a template
//! is ever evaluated.

use crate::env::Environment;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})$").expect("static color regex")
});

/// Values substituted into a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptValues {
    pub cwd: String,
    pub user: String,
    pub host: String,
    pub status: i32,
}

impl PromptValues {
    pub fn from_env(env: &Environment) -> Self {
        let home = env.home_dir();
        Self {
            cwd: display_cwd(&env.current_dir, home.as_deref()),
            user: env
                .get_var("USER")
                .or_else(|| env.get_var("LOGNAME"))
                .unwrap_or_else(|| "user".to_string()),
            host: hostname(),
            status: env.last_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    color: Option<(u8, u8, u8)>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            color: None,
        }
    }

    /// Colour the rendered prompt with a `#rrggbb` foreground.
    ///
    /// An invalid colour is logged and ignored.
    pub fn with_color(mut self, color: Option<&str>) -> Self {
        self.color = color.and_then(|c| {
            let parsed = parse_color(c);
            if parsed.is_none() {
                tracing::warn!(color = c, "ignoring prompt colour, expected #rrggbb");
            }
            parsed
        });
        self
    }

    pub fn render(&self, env: &Environment) -> String {
        self.render_with(&PromptValues::from_env(env))
    }

    pub fn render_with(&self, values: &PromptValues) -> String {
        let text = expand(&self.template, values);
        match self.color {
            Some((r, g, b)) => format!("\x1b[38;2;{r};{g};{b}m{text}\x1b[0m"),
            None => text,
        }
    }
}

fn expand(template: &str, values: &PromptValues) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(i) = rest.find(['{', '}']) {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        if let Some(after) = rest.strip_prefix("{{") {
            out.push('{');
            rest = after;
        } else if let Some(after) = rest.strip_prefix("}}") {
            out.push('}');
            rest = after;
        } else if let Some(close) = rest.strip_prefix('{').and_then(|r| r.find('}')) {
            let name = &rest[1..close + 1];
            match name {
                "cwd" => out.push_str(&values.cwd),
                "user" => out.push_str(&values.user),
                "host" => out.push_str(&values.host),
                "status" => out.push_str(&values.status.to_string()),
                _ => out.push_str(&rest[..close + 2]),
            }
            rest = &rest[close + 2..];
        } else {
            out.push_str(&rest[..1]);
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

/// `#rrggbb` to an RGB triple.
pub fn parse_color(color: &str) -> Option<(u8, u8, u8)> {
    let caps = HEX_COLOR.captures(color)?;
    let channel = |i: usize| u8::from_str_radix(&caps[i], 16).ok();
    Some((channel(1)?, channel(2)?, channel(3)?))
}

/// The working directory with the home prefix shown as `~`.
fn display_cwd(cwd: &Path, home: Option<&Path>) -> String {
    match home.and_then(|h| cwd.strip_prefix(h).ok()) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => cwd.display().to_string(),
    }
}

fn hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
