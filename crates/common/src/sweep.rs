//! Parameter sweeps and the `submit` command line
//!
//! `submit` expands `-p` and `-d` flags into one job per parameter
//! combination. Scenarios use [`SweepArgs::job_count`] to know how many
//! result directories a run has to produce.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

const DEFAULT_SEPARATOR: &str = ",";

/// Files a sweep refers to: parameter files, csv files and glob targets
pub trait SweepFiles {
    fn read(&self, path: &str) -> Option<String>;
    fn glob(&self, pattern: &str) -> Vec<String>;
}

/// In-memory file set, used when the files are written by the scenario itself
impl SweepFiles for BTreeMap<String, String> {
    fn read(&self, path: &str) -> Option<String> {
        self.get(path).cloned()
    }

    fn glob(&self, pattern: &str) -> Vec<String> {
        self.keys()
            .filter(|name| glob_match(pattern, name))
            .cloned()
            .collect()
    }
}

/// Shell style matching of `*` and `?`
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn go(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => go(&p[1..], n) || (!n.is_empty() && go(p, &n[1..])),
            (Some('?'), Some(_)) => go(&p[1..], &n[1..]),
            (Some(a), Some(b)) if a == b => go(&p[1..], &n[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    go(&p, &n)
}

/// The values a single `@@NAME=...` definition takes
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValues {
    /// `a,b,c` split on the active separator
    List(Vec<String>),
    /// `start:step:end`
    Stepped { start: f64, step: f64, end: f64 },
    /// `a-b` over integers, both ends included
    Integers { start: i64, end: i64 },
    /// `start-end in N` or `start-end in N log`
    Spaced { start: f64, end: f64, count: usize, log: bool },
    /// `glob:pattern` over file names
    Glob(String),
}

impl ParameterValues {
    fn parse(input: &str, separator: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSweep {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let text = input.trim();
        if text.is_empty() {
            return Err(invalid("no values"));
        }

        if let Some(pattern) = text.strip_prefix("glob:") {
            return Ok(ParameterValues::Glob(pattern.trim().to_string()));
        }

        if let Some((range, tail)) = text.split_once(" in ") {
            let mut words = tail.split_whitespace();
            let count: usize = words
                .next()
                .and_then(|w| w.parse().ok())
                .ok_or_else(|| invalid("expected a point count after 'in'"))?;
            let log = match words.next() {
                None => false,
                Some("log") => true,
                Some(_) => return Err(invalid("only 'log' may follow the point count")),
            };
            let (start, end) = split_float_range(range.trim()).ok_or_else(|| invalid("bad range"))?;
            if !(start.is_finite() && end.is_finite()) {
                return Err(invalid("range bounds must be finite"));
            }
            if log && (start <= 0.0 || end <= 0.0) {
                return Err(invalid("log spacing needs positive bounds"));
            }
            return Ok(ParameterValues::Spaced {
                start,
                end,
                count,
                log,
            });
        }

        let items: Vec<&str> = text
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if items.len() > 1 {
            return Ok(ParameterValues::List(
                items.into_iter().map(String::from).collect(),
            ));
        }

        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() == 3 {
            let nums: Vec<f64> = parts.iter().filter_map(|p| p.trim().parse().ok()).collect();
            if nums.len() == 3 {
                if !nums.iter().all(|n| n.is_finite()) {
                    return Err(invalid("range bounds must be finite"));
                }
                if nums[1] == 0.0 || (nums[2] - nums[0]) / nums[1] < 0.0 {
                    return Err(invalid("step does not reach the end value"));
                }
                return Ok(ParameterValues::Stepped {
                    start: nums[0],
                    step: nums[1],
                    end: nums[2],
                });
            }
        }

        if let Some((a, b)) = text.split_once('-') {
            if let (Ok(start), Ok(end)) = (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
                if end < start {
                    return Err(invalid("integer range runs backwards"));
                }
                return Ok(ParameterValues::Integers { start, end });
            }
        }

        Ok(ParameterValues::List(vec![text.to_string()]))
    }

    /// Number of values, without expanding them
    pub fn count(&self, files: &dyn SweepFiles) -> usize {
        match self {
            ParameterValues::List(items) => items.len(),
            ParameterValues::Stepped { start, step, end } => {
                stepped_steps(*start, *step, *end).saturating_add(1)
            }
            ParameterValues::Integers { start, end } => {
                usize::try_from(end.abs_diff(*start)).map_or(usize::MAX, |n| n.saturating_add(1))
            }
            ParameterValues::Spaced { count, .. } => *count,
            ParameterValues::Glob(pattern) => files.glob(pattern).len(),
        }
    }

    /// Every value the definition expands to
    pub fn expand(&self, files: &dyn SweepFiles) -> Vec<String> {
        match self {
            ParameterValues::List(items) => items.clone(),
            ParameterValues::Stepped { start, step, end } => {
                let steps = stepped_steps(*start, *step, *end);
                (0..=steps)
                    .map(|i| format_number(start + step * i as f64))
                    .collect()
            }
            ParameterValues::Integers { start, end } => {
                (*start..=*end).map(|i| i.to_string()).collect()
            }
            ParameterValues::Spaced {
                start,
                end,
                count,
                log,
            } => (0..*count)
                .map(|i| {
                    let frac = if *count > 1 {
                        i as f64 / (*count - 1) as f64
                    } else {
                        0.0
                    };
                    let v = if *log {
                        start * (end / start).powf(frac)
                    } else {
                        start + (end - start) * frac
                    };
                    format_number(v)
                })
                .collect(),
            ParameterValues::Glob(pattern) => files.glob(pattern),
        }
    }
}

/// Whole steps from `start` to `end`; the float to int cast saturates
fn stepped_steps(start: f64, step: f64, end: f64) -> usize {
    ((end - start) / step + 1e-9).floor() as usize
}

fn split_float_range(range: &str) -> Option<(f64, f64)> {
    // the dash that separates the bounds is the one not inside an exponent
    let bytes = range.as_bytes();
    for (i, c) in range.char_indices().skip(1) {
        if c == '-' && !matches!(bytes[i - 1], b'e' | b'E') {
            let start = range[..i].trim().parse().ok()?;
            let end = range[i + 1..].trim().parse().ok()?;
            return Some((start, end));
        }
    }
    None
}

fn format_number(v: f64) -> String {
    let rounded = (v * 1e9).round() / 1e9;
    format!("{}", rounded)
}

/// A named sweep parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub values: ParameterValues,
}

impl Parameter {
    /// Parse `@@NAME=values`
    pub fn parse(definition: &str, separator: &str) -> Result<Self> {
        let (name, values) = definition.split_once('=').ok_or_else(|| Error::InvalidSweep {
            input: definition.to_string(),
            reason: "expected @@NAME=values".to_string(),
        })?;
        let name = name.trim();
        if !name.starts_with("@@") || name.len() == 2 {
            return Err(Error::InvalidSweep {
                input: definition.to_string(),
                reason: "parameter names start with @@".to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            values: ParameterValues::parse(values, separator)?,
        })
    }
}

/// One sweep flag, in command line order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepArg {
    /// `-s <sep>`: separator for the `-p` flags that follow
    Separator(String),
    /// `-p <input>`
    Parameters(String),
    /// `-d <csv>`
    DataFile(String),
    /// `-i <file>`
    InputFile(String),
}

impl SweepArg {
    fn flag(&self) -> (&'static str, &str) {
        match self {
            SweepArg::Separator(v) => ("-s", v),
            SweepArg::Parameters(v) => ("-p", v),
            SweepArg::DataFile(v) => ("-d", v),
            SweepArg::InputFile(v) => ("-i", v),
        }
    }
}

/// The sweep related flags of one `submit` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepArgs {
    args: Vec<SweepArg>,
}

impl SweepArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the sweep flags out of a tokenised command line
    pub fn parse<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = Vec::new();
        let mut tokens = tokens.into_iter();
        while let Some(token) = tokens.next() {
            let token = token.as_ref();
            let make: fn(String) -> SweepArg = match token {
                "-s" => SweepArg::Separator,
                "-p" => SweepArg::Parameters,
                "-d" => SweepArg::DataFile,
                "-i" => SweepArg::InputFile,
                _ => continue,
            };
            let value = tokens.next().ok_or_else(|| Error::InvalidSweep {
                input: token.to_string(),
                reason: "flag is missing its value".to_string(),
            })?;
            args.push(make(value.as_ref().to_string()));
        }
        Ok(Self { args })
    }

    pub fn push(&mut self, arg: SweepArg) -> &mut Self {
        self.args.push(arg);
        self
    }

    pub fn args(&self) -> &[SweepArg] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Parameters in effect, later definitions of a name replacing earlier ones
    pub fn parameters(&self, files: &dyn SweepFiles) -> Result<Vec<Parameter>> {
        let mut separator = DEFAULT_SEPARATOR.to_string();
        let mut by_name: BTreeMap<String, Parameter> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut add = |p: Parameter| {
            if !order.contains(&p.name) {
                order.push(p.name.clone());
            }
            by_name.insert(p.name.clone(), p);
        };

        for arg in &self.args {
            match arg {
                SweepArg::Separator(sep) => separator = sep.clone(),
                SweepArg::Parameters(input) => {
                    for p in parameters_from_list(input, &separator, files)? {
                        add(p);
                    }
                }
                SweepArg::DataFile(_) | SweepArg::InputFile(_) => {}
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect())
    }

    /// Number of jobs `submit` launches for these flags
    ///
    /// Independent parameters multiply; the rows of a csv file vary
    /// together and count once each.
    pub fn job_count(&self, files: &dyn SweepFiles) -> Result<usize> {
        let mut count = 1usize;
        for p in self.parameters(files)? {
            count = count.saturating_mul(p.values.count(files));
        }
        for arg in &self.args {
            if let SweepArg::DataFile(path) = arg {
                let csv = files
                    .read(path)
                    .ok_or_else(|| Error::MissingSweepFile(path.clone()))?;
                count = count.saturating_mul(csv_rows(&csv));
            }
        }
        Ok(count)
    }
}

/// Data rows in a sweep csv file; the first line names the parameters
pub fn csv_rows(csv: &str) -> usize {
    csv.lines()
        .filter(|l| !l.trim().is_empty())
        .skip(1)
        .count()
}

/// `@@X=...`, a parameter file name, or `file;@@X=...;@@Y=...`
fn parameters_from_list(
    input: &str,
    separator: &str,
    files: &dyn SweepFiles,
) -> Result<Vec<Parameter>> {
    let mut out = Vec::new();
    for (i, piece) in input.split(';').map(str::trim).enumerate() {
        if piece.is_empty() {
            continue;
        }
        if piece.starts_with("@@") {
            out.push(Parameter::parse(piece, separator)?);
        } else if i == 0 {
            let text = files
                .read(piece)
                .ok_or_else(|| Error::MissingSweepFile(piece.to_string()))?;
            out.extend(parameters_from_file(&text)?);
        } else {
            return Err(Error::InvalidSweep {
                input: input.to_string(),
                reason: format!("unexpected '{}'", piece),
            });
        }
    }
    Ok(out)
}

/// Definitions in a parameters file: `parameter @@X = values` lines
pub fn parameters_from_file(text: &str) -> Result<Vec<Parameter>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| {
            let definition = line.strip_prefix("parameter").unwrap_or(line).trim();
            Parameter::parse(definition, DEFAULT_SEPARATOR)
        })
        .collect()
}

/// Builder for a `submit` command line
#[derive(Debug, Clone, Default)]
pub struct SubmitCommand {
    local: bool,
    metrics: bool,
    no_heartbeat: bool,
    version: bool,
    help: bool,
    sweep: SweepArgs,
    program: Vec<String>,
    detach_stdin: bool,
}

impl SubmitCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn metrics(mut self) -> Self {
        self.metrics = true;
        self
    }

    pub fn no_heartbeat(mut self) -> Self {
        self.no_heartbeat = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn help(mut self) -> Self {
        self.help = true;
        self
    }

    pub fn separator(mut self, sep: impl Into<String>) -> Self {
        self.sweep.push(SweepArg::Separator(sep.into()));
        self
    }

    pub fn param(mut self, input: impl Into<String>) -> Self {
        self.sweep.push(SweepArg::Parameters(input.into()));
        self
    }

    pub fn data(mut self, csv: impl Into<String>) -> Self {
        self.sweep.push(SweepArg::DataFile(csv.into()));
        self
    }

    pub fn input(mut self, file: impl Into<String>) -> Self {
        self.sweep.push(SweepArg::InputFile(file.into()));
        self
    }

    /// Program and arguments to run, passed through verbatim
    pub fn program<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program.extend(args.into_iter().map(Into::into));
        self
    }

    /// Read stdin from /dev/null so the sweep progress screen stays closed
    pub fn detach_stdin(mut self) -> Self {
        self.detach_stdin = true;
        self
    }

    pub fn sweep(&self) -> &SweepArgs {
        &self.sweep
    }

    pub fn job_count(&self, files: &dyn SweepFiles) -> Result<usize> {
        self.sweep.job_count(files)
    }

    pub fn to_command_line(&self) -> String {
        let mut words: Vec<String> = vec!["submit".to_string()];
        if self.help {
            words.push("--help".to_string());
        }
        if self.version {
            words.push("--version".to_string());
        }
        if self.local {
            words.push("--local".to_string());
        }
        if self.metrics {
            words.push("--metrics".to_string());
        }
        if self.no_heartbeat {
            words.push("--noHeartbeat".to_string());
        }
        for arg in self.sweep.args() {
            let (flag, value) = arg.flag();
            words.push(flag.to_string());
            words.push(shell_escape::escape(Cow::Borrowed(value)).into_owned());
        }
        words.extend(self.program.iter().cloned());
        if self.detach_stdin {
            words.push("0</dev/null".to_string());
        }
        words.join(" ")
    }
}
