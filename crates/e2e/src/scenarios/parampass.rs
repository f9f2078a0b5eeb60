//! Passing parameters to a tool through the invoke url
//!
//! A throwaway tool, `hppt`, is installed by the apps account. Its only
//! program, `printparams`, writes its arguments to `pp.out` in the session
//! directory. The scenarios launch it from the website with a `params`
//! query argument and then compare, from inside the new container, the
//! `TOOL_PARAMETERS` file and the program's arguments with what was sent.

use std::sync::Arc;

use async_trait::async_trait;
use hubcheck_common::parse::tool_parameters_path;
use hubcheck_common::text::{shrink_space, strip_only};
use hubcheck_common::{InvokeApp, ToolParameters};
use tracing::{debug, info};

use crate::actions::{account, launch_tool_with_parameters};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{ClassScope, Finalizers, SharedResources};
use crate::retry::PollPolicy;
use crate::runner::{Scenario, TestContext};
use crate::scenarios::sessions::reconcile_after;
use crate::scenarios::{become_apps, leave_apps, SessionShell, APPS_ROLE, REGISTERED_ROLE};
use crate::shell::Workspace;

pub const TOOL_NAME: &str = "hppt";

/// Installed revision; the invoke url asks for `test`, which follows `dev`
const TOOL_REVISION: u32 = 2;
const URL_REVISION: &str = "test";

const PROGRAM_NAME: &str = "printparams";
const PROGRAM_OUTPUT: &str = "pp.out";

const PRINTPARAMS: &str = r#"#!/bin/sh
# \
exec wish "$0" ${1+"$@"}

set params_file_out pp.out
set fid [open $params_file_out w]
puts -nonewline $fid $argv
close $fid

label .text -text "Running..."
button .close -text "Quit" -command {exit 1}
pack .text -side top
pack .close -side top
"#;

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    let mut scenarios: Vec<Box<dyn Scenario>> = Vec::new();
    for case in invoke_script_cases() {
        scenarios.push(Box::new(case));
    }
    for case in url_cases() {
        scenarios.push(Box::new(case));
    }
    scenarios
}

fn invoke_script_cases() -> Vec<InvokeScriptCase> {
    const TEMPLATE: &str = "printparams @@file(datafile1)";
    vec![
        InvokeScriptCase {
            name: "test_1_command_no_templates_no_parameters_file",
            commands: &[PROGRAM_NAME],
            datafiles: &[],
        },
        InvokeScriptCase {
            name: "test_1_command_no_templates_with_parameters_file",
            commands: &[PROGRAM_NAME],
            datafiles: &["datafile1"],
        },
        InvokeScriptCase {
            name: "test_1_template_1_default_run_default",
            commands: &[TEMPLATE, PROGRAM_NAME],
            datafiles: &[],
        },
        InvokeScriptCase {
            name: "test_1_template_1_default_run_template",
            commands: &[TEMPLATE, PROGRAM_NAME],
            datafiles: &["datafile1"],
        },
        InvokeScriptCase {
            name: "test_1_template_0_default_run_template_1",
            commands: &[TEMPLATE],
            datafiles: &["datafile1"],
        },
    ]
}

fn url_cases() -> Vec<UrlCase> {
    use Normalize::{Shrink, StripOnly};
    use UrlExpect::{BadParameters, Received};

    let case = UrlCase::new;
    vec![
        case("test_launch_tool_no_parameters_file", &[], StripOnly, Received),
        UrlCase {
            add_empty_params: true,
            ..case("test_launch_tool_empty_parameters", &[], StripOnly, Received)
        },
        case(
            "test_launch_tool_invalid_path_4",
            &["file(datafile1):/bad_home/bad_hubname/fake_user/file_does_not_exist"],
            StripOnly,
            BadParameters,
        ),
        case(
            "test_launch_tool_blacklisted_path_1",
            &["file(datafile1):/etc/environ"],
            StripOnly,
            BadParameters,
        ),
        case(
            "test_launch_tool_whitelisted_path_3",
            &["directory:/home/blahh"],
            StripOnly,
            Received,
        ),
        case(
            "test_launch_tool_home_expansion_1",
            &["file(datafile1):~/.icewm/menu"],
            StripOnly,
            Received,
        ),
        case(
            "test_launch_tool_named_file_1",
            &["file(datafile1):{sessiondir}/resources"],
            StripOnly,
            Received,
        ),
        case(
            "test_launch_tool_named_file_2",
            &[
                "file(datafile1):{sessiondir}/resources",
                "file(datafile2):{home}/.icewm/menu",
            ],
            StripOnly,
            Received,
        ),
        case(
            "test_launch_tool_file_format_1",
            &["file(datafile2):{home}/.icewm/menu", ""],
            Shrink,
            Received,
        ),
        case(
            "test_launch_tool_file_format_2",
            &["file(datafile2):{home}/.icewm/menu", "", ""],
            Shrink,
            Received,
        ),
        case(
            "test_launch_tool_file_format_3",
            &["", "", "file(datafile2):{home}/.icewm/menu", "", ""],
            Shrink,
            Received,
        ),
        case(
            "test_launch_tool_file_format_4",
            &["", "", "file(datafile2):{home}/.icewm/menu"],
            Shrink,
            Received,
        ),
        case(
            "test_launch_tool_file_format_5",
            &[
                "file(datafile2):{home}/.icewm/menu",
                "",
                "file(datafile2):{home}/.icewm/preferences",
            ],
            StripOnly,
            Received,
        ),
        case(
            "test_launch_tool_file_format_6",
            &[
                "file(datafile2):{home}/.icewm/menu",
                "",
                "",
                "file(datafile2):{home}/.icewm/preferences",
            ],
            StripOnly,
            Received,
        ),
    ]
}

/// `type:path` lines joined the way the website expects them
fn parameters_text<S: AsRef<str>>(entries: &[(S, S)]) -> String {
    entries
        .iter()
        .map(|(kind, path)| format!("{}:{}", kind.as_ref(), path.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Arguments `printparams` should be started with
fn expected_arguments(app: &InvokeApp, parameters: &str) -> E2eResult<String> {
    let params = if parameters.is_empty() {
        None
    } else {
        Some(ToolParameters::parse(parameters)?)
    };
    let command = app.expected_command(params.as_ref()).ok_or_else(|| {
        E2eError::Setup(format!("no command of {:?} can run", app.commands()))
    })?;
    Ok(command
        .strip_prefix(PROGRAM_NAME)
        .unwrap_or(&command)
        .trim()
        .to_string())
}

fn invoke_script(app: &InvokeApp) -> String {
    format!("#!/bin/sh\n{}\n", app.to_command_line())
}

/// As the apps account, replace the tool's revision with `invoke_script`
/// and the `printparams` program
async fn install_tool(ws: &mut Workspace, invoke_script: &str) -> E2eResult<()> {
    let tool_path = format!("/apps/{}/r{}", TOOL_NAME, TOOL_REVISION);
    let dev_path = format!("/apps/{}/dev", TOOL_NAME);
    become_apps(ws).await?;

    let installed = async {
        ws.execute_all(&[
            format!("rm -rf {}", tool_path),
            format!("mkdir {}", tool_path),
            format!("rm -f {}", dev_path),
            format!("ln -s {} {}", tool_path, dev_path),
            format!("cd {}", tool_path),
            "mkdir middleware bin".to_string(),
        ])
        .await?;
        ws.write_file("middleware/invoke", invoke_script).await?;
        ws.chmod("middleware/invoke", 0o755).await?;
        let program = format!("bin/{}", PROGRAM_NAME);
        ws.write_file(&program, PRINTPARAMS).await?;
        ws.chmod(&program, 0o755).await
    }
    .await;

    leave_apps(ws).await?;
    installed?;
    info!("Installed {} r{}", TOOL_NAME, TOOL_REVISION);
    Ok(())
}

async fn install_as_apps(hub: &SharedResources, invoke_script: &str) -> E2eResult<()> {
    let toolname = hub.settings.apps_workspace_toolname.clone();
    let mut shell = SessionShell::open(hub, APPS_ROLE, Some(&toolname)).await?;
    let result = install_tool(&mut shell.ws, invoke_script).await;
    shell.finish(result).await
}

/// Contents of the file `TOOL_PARAMETERS` points at, or "" when the
/// container was started without one
async fn container_parameters(ws: &mut Workspace) -> E2eResult<String> {
    let (ps, _) = ws.execute_unchecked("ps aux | grep TOOL_PARAMETERS").await?;
    match tool_parameters_path(&ps) {
        Some(path) => ws.read_file(&path).await,
        None => Ok(String::new()),
    }
}

/// `pp.out`, waiting for it to show up on slow NFS
async fn program_output(ws: &mut Workspace, poll: PollPolicy) -> E2eResult<String> {
    let sessiondir = ws.output("echo ${SESSIONDIR}").await?;
    let path = format!("{}/{}", sessiondir.trim(), PROGRAM_OUTPUT);
    let give_up = tokio::time::Instant::now() + poll.deadline;
    while !ws.bash_test(&format!("-e {}", path)).await? {
        if tokio::time::Instant::now() >= give_up {
            break;
        }
        tokio::time::sleep(poll.interval).await;
    }
    ws.read_file(&path).await
}

/// What a launched container saw
struct Received {
    number: u64,
    parameters: String,
    program: Option<String>,
}

/// Launch the tool with `text` and look inside the new container
async fn launch_and_inspect(
    hub: &SharedResources,
    username: &str,
    password: &str,
    text: &str,
    add_empty_params: bool,
    read_program_output: bool,
) -> E2eResult<Received> {
    hub.browser.get(&hub.urls.https_authority).await?;
    let number = launch_tool_with_parameters(
        &hub.catalog,
        username,
        password,
        TOOL_NAME,
        URL_REVISION,
        text,
        add_empty_params,
    )
    .await?;
    info!("{} started in session {}", TOOL_NAME, number);

    let mut ws = hub
        .containers
        .access_session(hub.hub_host(), username, password, number)
        .await?;
    let inspected = async {
        ws.execute("cd $SESSIONDIR").await?;
        let parameters = container_parameters(&mut ws).await?;
        let program = if read_program_output {
            Some(program_output(&mut ws, hub.settings.session_poll()).await?)
        } else {
            None
        };
        Ok::<_, E2eError>((parameters, program))
    }
    .await;
    ws.close().await?;
    account::logout(&hub.catalog).await?;

    let (parameters, program) = inspected?;
    Ok(Received {
        number,
        parameters,
        program,
    })
}

fn parameters_mismatch(sent: &str, received: &str) -> String {
    format!(
        "TOOL_PARAMETERS file in container does not match data sent through url.\nexpected:\n{:?}\nreceived:\n{:?}",
        sent, received
    )
}

/// An invoke script installed by the apps account, launched with datafiles
pub struct InvokeScriptCase {
    name: &'static str,
    commands: &'static [&'static str],
    /// Files written to `$HOME` and passed as `file(<name>)`
    datafiles: &'static [&'static str],
}

impl InvokeScriptCase {
    fn app(&self) -> InvokeApp {
        self.commands
            .iter()
            .fold(InvokeApp::new(), |app, c| app.command(*c))
    }

    async fn exercise(
        &self,
        hub: &SharedResources,
        shell: &mut SessionShell,
        username: &str,
        password: &str,
    ) -> E2eResult<()> {
        let home = shell.ws.output("echo ${HOME}").await?.trim().to_string();
        let mut entries = Vec::new();
        for name in self.datafiles {
            let path = format!("{}/{}", home, name);
            shell
                .put_at(path.clone(), format!("this is {}", name), None)
                .await?;
            entries.push((format!("file({})", name), path));
        }
        let text = parameters_text(&entries);

        let app = self.app();
        let expected = expected_arguments(&app, &text)?;
        install_as_apps(hub, &invoke_script(&app)).await?;

        let received = launch_and_inspect(hub, username, password, &text, false, true).await?;
        E2eError::check(received.parameters == text, || {
            parameters_mismatch(&text, &received.parameters)
        })?;
        let program = received.program.unwrap_or_default();
        E2eError::check(program == expected, || {
            format!(
                "session {}: expected parameters: {:?}\nreceived parameters: {:?}",
                received.number, expected, program
            )
        })
    }
}

#[async_trait]
impl Scenario for InvokeScriptCase {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        "TestParameterPassingInvokeApp"
    }

    fn tags(&self) -> &[&str] {
        &["website", "container", "parampass", "appsuser"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let (username, password) = ctx.hub().account_for(REGISTERED_ROLE)?;
        reconcile_after(ctx, &username, &password, Some(TOOL_NAME)).await?;
        let hub = ctx.hub();

        let mut shell = SessionShell::open(hub, REGISTERED_ROLE, None).await?;
        let result = self.exercise(hub, &mut shell, &username, &password).await;
        shell.finish(result).await
    }
}

/// How sent and received parameter text are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalize {
    /// Blank line runs collapse on the hub
    Shrink,
    StripOnly,
}

impl Normalize {
    fn apply(&self, text: &str) -> String {
        match self {
            Normalize::Shrink => shrink_space(text),
            Normalize::StripOnly => strip_only(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlExpect {
    /// The container's TOOL_PARAMETERS file holds what was sent
    Received,
    /// The website refuses the launch with a "Bad Parameters" box
    BadParameters,
}

/// Parameter text sent to the stock `printparams` tool
///
/// `{home}` and `{sessiondir}` in `lines` stand for the registered
/// account's directories.
pub struct UrlCase {
    name: &'static str,
    lines: &'static [&'static str],
    add_empty_params: bool,
    normalize: Normalize,
    expect: UrlExpect,
}

impl UrlCase {
    fn new(
        name: &'static str,
        lines: &'static [&'static str],
        normalize: Normalize,
        expect: UrlExpect,
    ) -> Self {
        Self {
            name,
            lines,
            add_empty_params: false,
            normalize,
            expect,
        }
    }

    fn render(&self, home: &str, sessiondir: &str) -> String {
        self.lines
            .iter()
            .map(|l| l.replace("{home}", home).replace("{sessiondir}", sessiondir))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn user_dirs(hub: &SharedResources) -> E2eResult<(String, String)> {
        let mut shell = SessionShell::open(hub, REGISTERED_ROLE, None).await?;
        let home = shell.ws.output("echo ${HOME}").await;
        let dirs = home.map(|h| (h.trim().to_string(), shell.sessiondir.clone()));
        shell.finish(dirs).await
    }
}

#[async_trait]
impl Scenario for UrlCase {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        "TestParameterPassingUrl"
    }

    fn tags(&self) -> &[&str] {
        &["website", "container", "parampass"]
    }

    async fn class_fixtures(
        &self,
        hub: &Arc<SharedResources>,
        _class: &ClassScope,
        _teardown: &mut Finalizers,
    ) -> E2eResult<()> {
        let app = InvokeApp::new().command(PROGRAM_NAME);
        install_as_apps(hub, &invoke_script(&app)).await
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let (username, password) = ctx.hub().account_for(REGISTERED_ROLE)?;
        reconcile_after(ctx, &username, &password, Some(TOOL_NAME)).await?;
        let hub = ctx.hub();

        let (home, sessiondir) = Self::user_dirs(hub).await?;
        let text = self.render(&home, &sessiondir);
        let launched = launch_and_inspect(
            hub,
            &username,
            &password,
            &text,
            self.add_empty_params,
            false,
        )
        .await;

        match (self.expect, launched) {
            (UrlExpect::BadParameters, Err(E2eError::BadParameters { message, .. })) => {
                debug!("Refused as expected: {}", message);
                Ok(())
            }
            (UrlExpect::BadParameters, Ok(received)) => Err(E2eError::AssertionFailed(format!(
                "while passing tool parameters, session {} started for bad path: {:?}",
                received.number, text
            ))),
            (UrlExpect::Received, Ok(received)) => {
                let sent = self.normalize.apply(&text);
                let got = self.normalize.apply(&received.parameters);
                E2eError::check(sent == got, || parameters_mismatch(&sent, &got))
            }
            (_, Err(e)) => Err(e),
        }
    }
}
