//! The submit client, run locally inside a container

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use hubcheck_common::parse::{metrics_wrap_output, results_directory, submit_versions};
use hubcheck_common::SubmitCommand;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{E2eError, E2eResult};
use crate::runner::{Scenario, TestContext};
use crate::scenarios::{helper, SessionShell, REGISTERED_ROLE};

/// Role of the account allowed to submit to remote venues
pub const SUBMIT_ROLE: &str = "submituser";

const HELLO: &str = "hello world";
const INDECK: &str = "sim1.indeck.template";

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    let mut scenarios: Vec<Box<dyn Scenario>> = Vec::new();
    for role in [SUBMIT_ROLE, REGISTERED_ROLE] {
        scenarios.push(Box::new(LocalSubmit::new("help", role, Check::NonEmpty, |c| c.help())));
        scenarios.push(Box::new(LocalSubmit::new(
            "local_no_metrics",
            role,
            Check::Exact(HELLO),
            |c| c.local(),
        )));
        scenarios.push(Box::new(LocalSubmit::new(
            "local_metrics",
            role,
            Check::MetricsWrap(HELLO),
            |c| c.local().metrics(),
        )));
    }
    scenarios.push(Box::new(LocalSubmit::new(
        "local_noHeartbeat_flag",
        REGISTERED_ROLE,
        Check::Exact(HELLO),
        |c| c.local().no_heartbeat(),
    )));
    scenarios.push(Box::new(
        LocalSubmit::new("version", REGISTERED_ROLE, Check::Versions, |c| c.version())
            // an unreachable submit server takes minutes to give up
            .with_timeout(Duration::from_secs(180)),
    ));

    scenarios.push(Box::new(ParameterSweep {
        name: "test_submit_single_parameter_substitution",
        params: &["@@C=10e-12,100e-12,1e-6"],
        indeck: "[inputs]\nC = @@C\n",
        params_file: None,
        jobs: 3,
        timeout: Duration::from_secs(60),
    }));
    scenarios.push(Box::new(ParameterSweep {
        name: "test_submit_multiple_parameter_substitution",
        params: &["@@Vin=0:0.2:5", "@@C=10e-12,100e-12,1e-6"],
        indeck: "[inputs]\nC = @@C\nVin = @@Vin\n",
        params_file: None,
        jobs: 26 * 3,
        timeout: Duration::from_secs(300),
    }));
    scenarios.push(Box::new(ParameterSweep {
        name: "test_submit_read_parameters_from_file",
        params: &["params"],
        indeck: "[inputs]\nC = @@C\nVin = @@Vin\n",
        params_file: Some("parameter @@Vin=0:0.2:5\nparameter @@C = 10e-12,100e-12,1e-6\n"),
        jobs: 26 * 3,
        timeout: Duration::from_secs(300),
    }));
    scenarios.push(Box::new(ParameterSweep {
        name: "test_submit_read_params_file_load_extra_params",
        params: &["params;@@Vin=5-7;@@R=100e3"],
        indeck: "[inputs]\nC = @@C\nVin = @@Vin\nR = @@R\n",
        params_file: Some("parameter @@C = 10e-12,100e-12,1e-6\n"),
        jobs: 3 * 3,
        timeout: Duration::from_secs(120),
    }));
    scenarios
}

/// What a successful run prints
#[derive(Debug, Clone, Copy)]
enum Check {
    NonEmpty,
    Exact(&'static str),
    /// `expected` between or after a start and a summary metrics record
    MetricsWrap(&'static str),
    /// Client, server and distributor version lines
    Versions,
}

impl Check {
    fn holds(&self, output: &str) -> bool {
        match self {
            Check::NonEmpty => !output.trim().is_empty(),
            Check::Exact(expected) => output.trim() == *expected,
            Check::MetricsWrap(expected) => metrics_wrap_output(output, expected),
            Check::Versions => submit_versions(output).is_some(),
        }
    }
}

/// `submit` running sayhi.py (or just printing something) as one role
pub struct LocalSubmit {
    name: String,
    role: &'static str,
    check: Check,
    build: fn(SubmitCommand) -> SubmitCommand,
    timeout: Duration,
}

impl LocalSubmit {
    fn new(
        what: &str,
        role: &'static str,
        check: Check,
        build: fn(SubmitCommand) -> SubmitCommand,
    ) -> Self {
        let name = if role == REGISTERED_ROLE && matches!(what, "version" | "local_noHeartbeat_flag") {
            format!("test_submit_{}", what)
        } else {
            format!("test_submit_{}_{}", what, role)
        };
        Self {
            name,
            role,
            check,
            build,
            timeout: Duration::from_secs(30),
        }
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exercise(&self, shell: &mut SessionShell, settings: &Settings) -> E2eResult<()> {
        let submit = (self.build)(SubmitCommand::new());
        let mut command = submit.to_command_line();
        if !matches!(self.check, Check::NonEmpty | Check::Versions) {
            let exe = shell.put("sayhi.py", helper(settings, "sayhi.py")?, Some(0o600)).await?;
            command = format!("{} python {}", command, exe);
        }

        let (output, status) = shell
            .ws
            .execute_with_timeout(&command, self.timeout, false)
            .await?;
        // --version reports through its output, not its status
        if !matches!(self.check, Check::Versions) {
            E2eError::check(status == 0, || {
                format!("While executing commands: {}\n{}", command, output)
            })?;
        }
        E2eError::check(self.check.holds(&output), || {
            format!("issuing the command '{}' returned '{}'", command, output)
        })
    }
}

#[async_trait]
impl Scenario for LocalSubmit {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        "TestSubmit"
    }

    fn tags(&self) -> &[&str] {
        &["container", "submit"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let mut shell = SessionShell::open(hub, self.role, None).await?;
        let result = self.exercise(&mut shell, &hub.settings).await;
        shell.finish(result).await
    }
}

/// A `submit --local -p ...` sweep over sim1.py, counting result directories
pub struct ParameterSweep {
    name: &'static str,
    params: &'static [&'static str],
    indeck: &'static str,
    /// Contents of a `params` file the specs may name
    params_file: Option<&'static str>,
    jobs: usize,
    timeout: Duration,
}

impl ParameterSweep {
    fn files(&self) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        files.insert(INDECK.to_string(), self.indeck.to_string());
        if let Some(params) = self.params_file {
            files.insert("params".to_string(), params.to_string());
        }
        files
    }

    fn command(&self, exe: &str) -> SubmitCommand {
        let deck = format!("@:{}", INDECK);
        self.params
            .iter()
            .fold(SubmitCommand::new().local(), |c, p| c.param(*p))
            .program([exe, "--inputdeck", deck.as_str()])
            .detach_stdin()
    }

    async fn exercise(&self, shell: &mut SessionShell, settings: &Settings) -> E2eResult<()> {
        let exe = shell.put("sim1.py", helper(settings, "sim1.py")?, Some(0o700)).await?;
        let files = self.files();
        for (name, contents) in &files {
            shell.put(name, contents.as_str(), None).await?;
        }

        let submit = self.command(&exe);
        let predicted = submit.job_count(&files)?;
        E2eError::check(predicted == self.jobs, || {
            format!("sweep flags describe {} jobs, expected {}", predicted, self.jobs)
        })?;

        let command = submit.to_command_line();
        let (output, _) = shell
            .ws
            .execute_with_timeout(&command, self.timeout, true)
            .await?;
        let resultsdir = results_directory(&output).ok_or_else(|| {
            E2eError::AssertionFailed(format!(
                "could not find results directory in output: {}",
                output
            ))
        })?;
        debug!("Sweep results in {}", resultsdir);

        let checked = self.check_results(shell, &resultsdir).await;
        shell
            .ws
            .execute_unchecked(&format!("rm -rf {}", resultsdir))
            .await?;
        checked
    }

    async fn check_results(&self, shell: &mut SessionShell, resultsdir: &str) -> E2eResult<()> {
        let listing = shell.ws.output(&format!("ls -d {}/*/", resultsdir)).await?;
        let dirs: Vec<&str> = listing.split_whitespace().collect();
        E2eError::check(dirs.len() == self.jobs, || {
            format!("num_results_dirs = {}, num_sweep_params = {}", dirs.len(), self.jobs)
        })?;

        for dir in &dirs {
            let dir = dir.trim_end_matches('/');
            let exists = shell.ws.bash_test(&format!("-r {}/out.log", dir)).await?;
            E2eError::check(exists, || format!("missing {}/out.log", dir))?;
        }
        info!("{} sweep produced {} result directories", self.name, dirs.len());
        Ok(())
    }
}

#[async_trait]
impl Scenario for ParameterSweep {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        "TestSubmitSweep"
    }

    fn tags(&self) -> &[&str] {
        &["container", "submit", "sweep"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let mut shell = SessionShell::open(hub, REGISTERED_ROLE, None).await?;
        let result = self.exercise(&mut shell, &hub.settings).await;
        shell.finish(result).await
    }
}
