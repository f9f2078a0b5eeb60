//! invoke_app command selection, run for real inside a container
//!
//! Each case writes two read-only data files and a `slow_echo` script into
//! the session directory, optionally points `TOOL_PARAMETERS` at a
//! parameters file, and compares what the launched command printed.

use std::time::Duration;

use async_trait::async_trait;
use hubcheck_common::parse::{find_process, invoked_tool_output, ps_rows};
use hubcheck_common::{InvokeApp, ToolParameters};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::runner::{Scenario, TestContext};
use crate::scenarios::{SessionShell, REGISTERED_ROLE};

const PARAMETERS_PATH: &str = "parameters.hz";
const XVFB_RUN: &str = "xvfb-run -s \"-screen 0 800x600x24\"";
const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

const DATAFILE1: &str = "this is datafile1";
const DATAFILE2: &str = "this is datafile2";

/// Files every case starts with: name, contents, mode
const FILES: &[(&str, &str, u32)] = &[
    ("datafile1", DATAFILE1, 0o400),
    ("datafile2", DATAFILE2, 0o400),
    ("slow_echo", "sleep 3; echo $*", 0o400),
];

// xvfb shutting down can leave "XIO: fatal IO error" noise behind
static XIO_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)XIO.+remaining\.").ok());

/// What the tool should print
#[derive(Debug, Clone, Copy)]
enum Expect {
    Text(&'static str),
    /// The account's home directory
    Home,
}

pub struct InvokeAppCase {
    name: &'static str,
    app: InvokeApp,
    /// Data files named in the parameters file; `None` leaves
    /// `TOOL_PARAMETERS` unset
    parameters: Option<&'static [&'static str]>,
    expect: Expect,
    background: Option<&'static str>,
    /// Run detached from the tty so invoke_app takes its non-interactive path
    nohup: bool,
}

impl InvokeAppCase {
    fn new(name: &'static str, app: InvokeApp, expect: Expect) -> Self {
        Self {
            name,
            app,
            parameters: None,
            expect,
            background: None,
            nohup: false,
        }
    }

    fn with_parameters(mut self, files: &'static [&'static str]) -> Self {
        self.parameters = Some(files);
        self
    }

    fn with_background(mut self, command: &'static str) -> Self {
        self.background = Some(command);
        self
    }

    fn detached(mut self) -> Self {
        self.nohup = true;
        self
    }
}

fn app(commands: &[&str]) -> InvokeApp {
    commands.iter().fold(InvokeApp::new(), |app, c| app.command(*c))
}

const CAT1: &str = "cat @@file(datafile1)";
const CAT2: &str = "cat @@file(datafile2)";
const ECHO_HI: &str = "sh ./slow_echo hi";

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    use Expect::*;

    let cases = vec![
        InvokeAppCase::new("test_1_command_no_templates", app(&[ECHO_HI]), Text("hi")),
        InvokeAppCase::new(
            "test_3_commands_no_templates",
            app(&[ECHO_HI, "sh ./slow_echo bye", "sh ./slow_echo yeah"]),
            Text("yeah"),
        ),
        InvokeAppCase::new("test_1_template_0_default_run_template_1", app(&[CAT1]), Text(DATAFILE1))
            .with_parameters(&["datafile1"]),
        InvokeAppCase::new(
            "test_1_template_1_default_run_template_1",
            app(&[CAT1, ECHO_HI]),
            Text(DATAFILE1),
        )
        .with_parameters(&["datafile1"]),
        InvokeAppCase::new("test_1_template_1_default_run_default", app(&[CAT1, ECHO_HI]), Text("hi"))
            .with_parameters(&[]),
        InvokeAppCase::new(
            "test_1_default_1_template_run_template_1",
            app(&[ECHO_HI, CAT1]),
            Text(DATAFILE1),
        )
        .with_parameters(&["datafile1"]),
        InvokeAppCase::new("test_1_default_1_template_run_default", app(&[ECHO_HI, CAT1]), Text("hi"))
            .with_parameters(&[]),
        InvokeAppCase::new(
            "test_2_templates_0_default_run_template_1",
            app(&[CAT1, CAT2]),
            Text(DATAFILE1),
        )
        .with_parameters(&["datafile1"]),
        InvokeAppCase::new(
            "test_2_templates_0_default_run_template_2",
            app(&[CAT1, CAT2]),
            Text(DATAFILE2),
        )
        .with_parameters(&["datafile2"]),
        InvokeAppCase::new(
            "test_2_templates_1_default_run_template_1",
            app(&[CAT1, CAT2, ECHO_HI]),
            Text(DATAFILE1),
        )
        .with_parameters(&["datafile1"]),
        InvokeAppCase::new(
            "test_2_templates_1_default_run_template_2",
            app(&[CAT1, CAT2, ECHO_HI]),
            Text(DATAFILE2),
        )
        .with_parameters(&["datafile2"]),
        InvokeAppCase::new("test_2_templates_1_default_run_default", app(&[CAT1, CAT2, ECHO_HI]), Text("hi"))
            .with_parameters(&[]),
        InvokeAppCase::new(
            "test_1_template_1_default_1_template_run_template_1",
            app(&[CAT1, ECHO_HI, CAT2]),
            Text(DATAFILE1),
        )
        .with_parameters(&["datafile1"]),
        InvokeAppCase::new(
            "test_1_template_1_default_1_template_run_template_2",
            app(&[CAT1, ECHO_HI, CAT2]),
            Text(DATAFILE2),
        )
        .with_parameters(&["datafile2"]),
        InvokeAppCase::new(
            "test_1_template_1_default_1_template_run_default",
            app(&[CAT1, ECHO_HI, CAT2]),
            Text("hi"),
        )
        .with_parameters(&[]),
        InvokeAppCase::new(
            "test_1_default_2_templates_run_template_1",
            app(&[ECHO_HI, CAT1, CAT2]),
            Text(DATAFILE1),
        )
        .with_parameters(&["datafile1"]),
        InvokeAppCase::new(
            "test_1_default_2_templates_run_template_2",
            app(&[ECHO_HI, CAT1, CAT2]),
            Text(DATAFILE2),
        )
        .with_parameters(&["datafile2"]),
        InvokeAppCase::new("test_1_default_2_template_run_default", app(&[ECHO_HI, CAT1, CAT2]), Text("hi"))
            .with_parameters(&[]),
        InvokeAppCase::new(
            "test_2_templates_1_default_run_index_1",
            app(&["cat @@file(#1)", CAT2, ECHO_HI]),
            Text(DATAFILE1),
        )
        .with_parameters(&["datafile1"]),
        InvokeAppCase::new(
            "test_positional_2_templates_1_default_run_index_1_2",
            app(&["cat @@file(#1) @@file(#2)", "cat @@file(#1)", ECHO_HI]),
            Text("this is datafile1this is datafile2"),
        )
        .with_parameters(&["datafile1", "datafile2"]),
        InvokeAppCase::new(
            "test_command_arguments_1",
            app(&["sh ./slow_echo"]).arguments("hi pete"),
            Text("hi pete"),
        ),
        InvokeAppCase::new("test_command_arguments_2", app(&[ECHO_HI]).arguments(""), Text("hi")),
        InvokeAppCase::new(
            "test_background_command_1",
            app(&[ECHO_HI]).background("sleep 23995946712"),
            Text("hi"),
        )
        .with_background("sleep 23995946712"),
        InvokeAppCase::new(
            "test_working_directory_1",
            app(&["sh ${SESSIONDIR}/slow_echo ${PWD}"]),
            Home,
        ),
        InvokeAppCase::new(
            "test_environment_variable_1",
            app(&["sh ./slow_echo ${FOO}"]).env("FOO", "blahh"),
            Text("blahh"),
        ),
        InvokeAppCase::new(
            "test_fullscreen_1",
            app(&["sh ./slow_echo ${FULLSCREEN}"]).no_fullscreen(),
            Text(""),
        )
        .detached(),
        InvokeAppCase::new("test_fullscreen_2", app(&["sh ./slow_echo ${FULLSCREEN}"]), Text("yes"))
            .detached(),
        InvokeAppCase::new(
            "test_path_environment_variable_1",
            app(&["sh ./slow_echo ${PATH} | cut -d\":\" -f 1"]).path("/blahh"),
            Text("/blahh"),
        ),
    ];

    cases
        .into_iter()
        .map(|c| Box::new(c) as Box<dyn Scenario>)
        .collect()
}

/// Parameters file naming each data file by its full path
fn parameters_text(sessiondir: &str, files: &[&str]) -> String {
    files
        .iter()
        .map(|f| format!("file({}):{}/{}", f, sessiondir, f))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tool output with xvfb noise removed
fn clean_tool_output(output: &str) -> String {
    match XIO_RE.as_ref() {
        Some(re) => re.replace_all(output, "").trim().to_string(),
        None => output.trim().to_string(),
    }
}

impl InvokeAppCase {
    async fn exercise(&self, shell: &mut SessionShell) -> E2eResult<()> {
        for (name, contents, mode) in FILES {
            shell.put(name, *contents, Some(*mode)).await?;
        }

        let mut app = self.app.clone();
        if matches!(self.expect, Expect::Home) {
            let home = shell.ws.output("echo $HOME").await?;
            app = app.directory(home.trim());
        }

        let mut params = None;
        if let Some(files) = self.parameters {
            let text = parameters_text(&shell.sessiondir, files);
            params = Some(ToolParameters::parse(&text)?);
            shell.put(PARAMETERS_PATH, text, None).await?;
            shell
                .ws
                .execute(&format!("export TOOL_PARAMETERS={}", PARAMETERS_PATH))
                .await?;
        }
        debug!(
            "{} should run {:?}",
            self.name,
            app.expected_command(params.as_ref())
        );

        let mut command = app.to_command_line();
        if self.nohup {
            command = format!("nohup {} > nohup.out && cat nohup.out", command);
        }
        let command = format!("{} {}", XVFB_RUN, command);

        let (output, status) = shell
            .ws
            .execute_with_timeout(&command, INVOKE_TIMEOUT, false)
            .await?;
        if self.nohup {
            let nohup_out = shell.path("nohup.out");
            shell.ws.remove_file(&nohup_out).await?;
        }
        E2eError::check(status == 0, || {
            format!("Error while executing '{}': {}", command, output)
        })?;

        let tool_output = invoked_tool_output(&output).map(|o| clean_tool_output(&o));
        let expected = match self.expect {
            Expect::Text(text) => text.to_string(),
            Expect::Home => shell.ws.output("echo $HOME").await?.trim().to_string(),
        };
        E2eError::check(tool_output.as_deref() == Some(expected.as_str()), || {
            format!(
                "Error while executing \"{}\": expected \"{}\"\nreceived \"{}\"",
                command,
                expected,
                tool_output.as_deref().unwrap_or(&output)
            )
        })?;

        if let Some(background) = self.background {
            let (listing, _) = shell
                .ws
                .execute_unchecked(&format!(
                    "ps aux | grep \"{}\" | grep -v -e \"bash\\|grep\"",
                    background
                ))
                .await?;
            let rows = ps_rows(&listing);
            let started = find_process(&rows, background).is_some();
            shell
                .ws
                .execute_unchecked(&format!("pkill -f \"{}\"", background))
                .await?;
            E2eError::check(started, || {
                format!("background command '{}' is not running", background)
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Scenario for InvokeAppCase {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        "TestInvokeApp"
    }

    fn tags(&self) -> &[&str] {
        &["container", "invoke_app"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let mut shell = SessionShell::open(ctx.hub(), REGISTERED_ROLE, None).await?;
        let result = self.exercise(&mut shell).await;
        shell.finish(result).await
    }
}
