//! Live acceptance run against a hub
//!
//! Run with: cargo test --package hubcheck-e2e --test acceptance -- --testdata hub.yaml
//!
//! Without a test data file (flag, settings or `HUBCHECK_TESTDATA`) the
//! run is skipped and exits 0.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hubcheck_e2e::fixtures::SharedScope;
use hubcheck_e2e::runner::{parse_delay, rappture_version_option};
use hubcheck_e2e::{scenarios, E2eResult, RunnerConfig, Settings, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "hubcheck-acceptance")]
#[command(about = "Acceptance checks for a HUBzero hub")]
struct Args {
    /// Settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Test data file, overriding the settings
    #[arg(long, env = "HUBCHECK_TESTDATA")]
    testdata: Option<PathBuf>,

    /// Alternate rappture runtime: dev, nightly-trunk or nightly-branch-X[.Y];
    /// anything else runs with the default one
    #[arg(long = "rappture_version")]
    rappture_version: Option<String>,

    /// Seconds to pause before each test, fractions allowed
    #[arg(long, default_value = "0", value_parser = parse_delay)]
    delay: Duration,

    /// Times to run each test
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    repeat: u32,

    /// Run only tests carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only the test with this name
    #[arg(short, long)]
    name: Option<String>,

    /// Output directory for results, overriding the settings
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: cannot start tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(hubcheck_common::default_config_path);
    let mut settings = Settings::load(&config_path)?;
    if let Some(testdata) = args.testdata {
        settings.testdata = Some(hubcheck_e2e::config::expand_path(&testdata));
    }
    if let Some(output) = args.output {
        settings.output_dir = output;
    }

    if settings.testdata.is_none() {
        println!("hubcheck: no test data configured, skipping acceptance run");
        return Ok(true);
    }

    let config = RunnerConfig {
        delay: args.delay,
        repeat: args.repeat,
        tag: args.tag,
        name: args.name,
        rappture_version: rappture_version_option(args.rappture_version),
        output_dir: settings.output_dir.clone(),
    };

    info!("hubcheck {}", hubcheck_e2e::VERSION);
    let scope = Arc::new(SharedScope::from_settings(settings)?);
    let mut runner = TestRunner::new(scope, config);
    runner.register_all(scenarios::all());

    let results = runner.run().await;
    runner.write_results(&results)?;

    Ok(results.success())
}
