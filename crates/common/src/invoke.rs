//! `invoke_app` command lines and its templated command selection
//!
//! A tool's invoke script is given one or more `-C` commands. Commands
//! that mention `@@file(...)` placeholders are templates; the rest are
//! defaults. Which one runs depends on the `TOOL_PARAMETERS` file the
//! middleware writes when a tool is launched with parameters.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

pub const INVOKE_APP_PATH: &str = "/usr/bin/invoke_app";

static PLACEHOLDER_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"@@file\((#\d+|[^)]+)\)").ok());

/// A reference inside a templated command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `@@file(name)`
    Named(String),
    /// `@@file(#N)`, the Nth file entry of the parameters file
    Index(usize),
}

impl Placeholder {
    /// Placeholders in `command`, in order of appearance
    pub fn find_all(command: &str) -> Vec<(std::ops::Range<usize>, Placeholder)> {
        let Some(re) = PLACEHOLDER_RE.as_ref() else {
            return Vec::new();
        };
        re.captures_iter(command)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let inner = caps.get(1)?.as_str();
                let placeholder = match inner.strip_prefix('#') {
                    Some(n) => Placeholder::Index(n.parse().ok()?),
                    None => Placeholder::Named(inner.to_string()),
                };
                Some((whole.range(), placeholder))
            })
            .collect()
    }
}

/// One `type(name):value` line of a parameters file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolParameter {
    pub kind: String,
    pub name: String,
    pub value: String,
}

/// Parsed contents of a `TOOL_PARAMETERS` file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolParameters {
    entries: Vec<ToolParameter>,
}

impl ToolParameters {
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bad = || Error::InvalidToolParameters(line.to_string());
            let (head, value) = line.split_once(':').ok_or_else(bad)?;
            let (kind, rest) = head.split_once('(').ok_or_else(bad)?;
            let name = rest.strip_suffix(')').ok_or_else(bad)?;
            if kind.is_empty() || name.is_empty() {
                return Err(bad());
            }
            entries.push(ToolParameter {
                kind: kind.to_string(),
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ToolParameter] {
        &self.entries
    }

    fn files(&self) -> impl Iterator<Item = &ToolParameter> {
        self.entries.iter().filter(|e| e.kind == "file")
    }

    /// The value a placeholder stands for, if the file provides one
    pub fn resolve(&self, placeholder: &Placeholder) -> Option<&str> {
        match placeholder {
            Placeholder::Named(name) => self
                .files()
                .find(|e| &e.name == name)
                .map(|e| e.value.as_str()),
            Placeholder::Index(n) => self
                .files()
                .nth(n.checked_sub(1)?)
                .map(|e| e.value.as_str()),
        }
    }
}

/// Outcome of command selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A template whose placeholders all resolved, already substituted
    Template { index: usize, command: String },
    /// A command without placeholders
    Default { index: usize, command: String },
    /// Templates only, none of them resolvable
    None,
}

impl Selection {
    pub fn command(&self) -> Option<&str> {
        match self {
            Selection::Template { command, .. } | Selection::Default { command, .. } => {
                Some(command)
            }
            Selection::None => None,
        }
    }
}

fn substitute(command: &str, params: &ToolParameters) -> Option<String> {
    let mut out = String::with_capacity(command.len());
    let mut last = 0;
    for (range, placeholder) in Placeholder::find_all(command) {
        out.push_str(&command[last..range.start]);
        out.push_str(params.resolve(&placeholder)?);
        last = range.end;
    }
    out.push_str(&command[last..]);
    Some(out)
}

/// Decide which of the `-C` commands the invoke script runs
pub fn select_command(commands: &[String], params: Option<&ToolParameters>) -> Selection {
    let is_template = |c: &String| !Placeholder::find_all(c).is_empty();

    if !commands.iter().any(is_template) {
        return match commands.last() {
            Some(command) => Selection::Default {
                index: commands.len() - 1,
                command: command.clone(),
            },
            None => Selection::None,
        };
    }

    if let Some(params) = params {
        for (index, command) in commands.iter().enumerate() {
            if !is_template(command) {
                continue;
            }
            if let Some(resolved) = substitute(command, params) {
                return Selection::Template {
                    index,
                    command: resolved,
                };
            }
        }
    }

    commands
        .iter()
        .enumerate()
        .rev()
        .find(|(_, c)| !is_template(c))
        .map(|(index, command)| Selection::Default {
            index,
            command: command.clone(),
        })
        .unwrap_or(Selection::None)
}

/// Builder for an `invoke_app` command line
#[derive(Debug, Clone, Default)]
pub struct InvokeApp {
    commands: Vec<String>,
    arguments: Option<String>,
    background: Vec<String>,
    directory: Option<String>,
    environment: Vec<(String, String)>,
    no_fullscreen: bool,
    path: Option<String>,
    rappture: Option<String>,
}

impl InvokeApp {
    pub fn new() -> Self {
        Self::default()
    }

    /// `-C`: a command or template
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    /// `-A`: extra arguments appended to the chosen command
    pub fn arguments(mut self, args: impl Into<String>) -> Self {
        self.arguments = Some(args.into());
        self
    }

    /// `-c`: a command started in the background
    pub fn background(mut self, command: impl Into<String>) -> Self {
        self.background.push(command.into());
        self
    }

    /// `-d`: working directory
    pub fn directory(mut self, dir: impl Into<String>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// `-e`: environment variable
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((name.into(), value.into()));
        self
    }

    /// `-f`: leave FULLSCREEN unset
    pub fn no_fullscreen(mut self) -> Self {
        self.no_fullscreen = true;
        self
    }

    /// `-p`: prepend to PATH
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// `-r`: rappture version
    pub fn rappture(mut self, version: impl Into<String>) -> Self {
        self.rappture = Some(version.into());
        self
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Command the script would run given `params`, with `-A` appended
    pub fn expected_command(&self, params: Option<&ToolParameters>) -> Option<String> {
        let selected = select_command(&self.commands, params);
        let command = selected.command()?;
        Some(match self.arguments.as_deref() {
            Some(args) if !args.is_empty() => format!("{} {}", command, args),
            _ => command.to_string(),
        })
    }

    pub fn to_command_line(&self) -> String {
        let quote = |s: &str| shell_escape::escape(Cow::Borrowed(s)).into_owned();
        let mut words = vec![INVOKE_APP_PATH.to_string()];
        for c in &self.commands {
            words.push("-C".to_string());
            words.push(quote(c));
        }
        if let Some(args) = &self.arguments {
            words.push("-A".to_string());
            words.push(if args.is_empty() {
                "\"\"".to_string()
            } else {
                quote(args)
            });
        }
        for c in &self.background {
            words.push("-c".to_string());
            words.push(quote(c));
        }
        if let Some(dir) = &self.directory {
            words.push("-d".to_string());
            words.push(quote(dir));
        }
        for (name, value) in &self.environment {
            words.push("-e".to_string());
            words.push(quote(&format!("{}={}", name, value)));
        }
        if self.no_fullscreen {
            words.push("-f".to_string());
        }
        if let Some(path) = &self.path {
            words.push("-p".to_string());
            words.push(quote(path));
        }
        if let Some(r) = &self.rappture {
            words.push("-r".to_string());
            words.push(quote(r));
        }
        words.join(" ")
    }
}
