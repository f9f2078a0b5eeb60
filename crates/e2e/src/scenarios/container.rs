//! Checks run from a shell inside a tool session container

use async_trait::async_trait;
use hubcheck_common::parse::{checknet_result, first_integer, is_package_installed, listen_uris};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::runner::{Scenario, TestContext};
use crate::scenarios::{helper, SessionShell, REGISTERED_ROLE};

pub const SUBMIT_CLIENT_CONFIG: &str = "/etc/submit/submit-client.conf";
pub const INSTALLED_PACKAGES: &str = "/var/tmp/installed_pkgs";

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(BasicFirewall),
        Box::new(SubmitServerReachable),
        Box::new(SubmitConfigReadable),
        Box::new(InstalledPackages),
        Box::new(SessionEnvironment),
        Box::new(ScriptPath {
            name: "test_paths_invoke_app",
            script: "invoke_app",
            current: "/usr/bin/invoke_app",
            old: &["/apps/rappture/invoke_app", "/apps/invoke/invoke_app"],
        }),
        Box::new(ScriptPath {
            name: "test_paths_submit",
            script: "submit",
            current: "/usr/bin/submit",
            old: &[],
        }),
    ]
}

/// Upload checknet.py and run it against each `(desc, host, port, expected)`
///
/// Returns one line per connection whose result differed.
async fn run_checknet(
    shell: &mut SessionShell,
    exe: &str,
    connections: &[(String, String, u16, bool)],
) -> E2eResult<Vec<String>> {
    let mut mismatches = Vec::new();
    for (desc, host, port, expected) in connections {
        let command = format!("{} --protocol tcp4 {} {}", exe, host, port);
        let output = shell.ws.output(&command).await?;
        let actual = checknet_result(&output);
        debug!("checknet {}:{} -> {}", host, port, actual);
        if actual != *expected {
            mismatches.push(format!(
                "{} connection {}:{} received {}, expected {}",
                desc, host, port, actual, expected
            ));
        }
    }
    Ok(mismatches)
}

/// Outbound firewall rules for a user in no network groups
pub struct BasicFirewall;

#[async_trait]
impl Scenario for BasicFirewall {
    fn name(&self) -> &str {
        "test_basic_connections"
    }

    fn class(&self) -> &str {
        "TestContainerFirewall"
    }

    fn tags(&self) -> &[&str] {
        &["container", "firewall"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let huburi = hub.urls.https_uri.clone();
        let connections: Vec<(String, String, u16, bool)> = [
            ("hub http", huburi.as_str(), hub.urls.http_port, true),
            ("hub https", huburi.as_str(), hub.urls.https_port, true),
            ("hub mysql", huburi.as_str(), 3306, false),
            ("hub ldap", huburi.as_str(), 389, false),
            ("google_http", "google.com", 80, false),
            ("google_https", "google.com", 443, false),
            ("opendns", "208.67.222.222", 53, false),
            ("google_dns", "8.8.8.8", 53, false),
            ("localhost", "localhost", 80, false),
        ]
        .into_iter()
        .map(|(d, h, p, e)| (d.to_string(), h.to_string(), p, e))
        .collect();

        let mut shell = SessionShell::open(hub, REGISTERED_ROLE, None).await?;
        let result = async {
            let exe = shell
                .put("checknet.py", helper(&hub.settings, "checknet.py")?, Some(0o700))
                .await?;
            let mismatches = run_checknet(&mut shell, &exe, &connections).await?;
            E2eError::check(mismatches.is_empty(), || mismatches.join("\n"))
        }
        .await;
        shell.finish(result).await
    }
}

/// At least one submit server from the client config accepts connections
pub struct SubmitServerReachable;

#[async_trait]
impl Scenario for SubmitServerReachable {
    fn name(&self) -> &str {
        "test_submit_server_connections"
    }

    fn class(&self) -> &str {
        "TestContainerFirewall"
    }

    fn tags(&self) -> &[&str] {
        &["container", "firewall", "submit"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let mut shell = SessionShell::open(hub, REGISTERED_ROLE, None).await?;
        let result = async {
            let config = shell.ws.read_file(SUBMIT_CLIENT_CONFIG).await?;
            let uris = listen_uris(&config);
            E2eError::check(!uris.is_empty(), || {
                format!("no listenURIs in {}", SUBMIT_CLIENT_CONFIG)
            })?;

            let exe = shell
                .put("checknet.py", helper(&hub.settings, "checknet.py")?, Some(0o700))
                .await?;
            let connections: Vec<_> = uris
                .iter()
                .map(|u| (u.uri.clone(), u.host.clone(), u.port, true))
                .collect();
            let failed = run_checknet(&mut shell, &exe, &connections).await?;

            // one reachable server is enough
            E2eError::check(failed.len() < connections.len(), || {
                format!("Could not connect to a submit server:\n{}", failed.join("\n"))
            })
        }
        .await;
        shell.finish(result).await
    }
}

pub struct SubmitConfigReadable;

#[async_trait]
impl Scenario for SubmitConfigReadable {
    fn name(&self) -> &str {
        "test_submit_resources_configuration_readable"
    }

    fn class(&self) -> &str {
        "TestContainerConfig"
    }

    fn tags(&self) -> &[&str] {
        &["container", "submit"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let mut shell = SessionShell::open(ctx.hub(), REGISTERED_ROLE, None).await?;
        let result = async {
            let readable = shell.ws.bash_test(&format!("-r {}", SUBMIT_CLIENT_CONFIG)).await?;
            E2eError::check(readable, || {
                format!("Submit configuration file ({}) is not readable", SUBMIT_CLIENT_CONFIG)
            })
        }
        .await;
        shell.finish(result).await
    }
}

/// Package name and whether it should be installed
const PACKAGES: &[(&str, bool)] = &[
    ("autoconf", true),
    ("ant", true),
    ("bash", true),
    ("bc", true),
    ("bison", true),
    ("bzip2", true),
    ("cmake", true),
    ("coreutils", true),
    ("doxygen", true),
    ("emacs", true),
    ("expect", true),
    ("flex", true),
    ("gfortran", true),
    ("git", true),
    ("gnuplot", true),
    ("make", true),
    ("octave", true),
    ("python", true),
    ("subversion", true),
    ("vim", true),
    ("xvfb", true),
    ("zip", true),
    ("openssh-server", false),
    ("sudo", false),
    ("telnetd", false),
];

/// Installed packages match the expected container image
pub struct InstalledPackages;

#[async_trait]
impl Scenario for InstalledPackages {
    fn name(&self) -> &str {
        "test_installed_packages"
    }

    fn class(&self) -> &str {
        "TestContainerPackages"
    }

    fn tags(&self) -> &[&str] {
        &["container", "packages"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let mut shell = SessionShell::open(ctx.hub(), REGISTERED_ROLE, None).await?;
        let result = async {
            if !shell.ws.bash_test(&format!("-r {}", INSTALLED_PACKAGES)).await? {
                return Err(E2eError::Skipped(format!("{} is not available", INSTALLED_PACKAGES)));
            }
            let listing = shell.ws.read_file(INSTALLED_PACKAGES).await?;

            let mut to_install = Vec::new();
            let mut to_remove = Vec::new();
            for (package, wanted) in PACKAGES {
                match (is_package_installed(&listing, package), *wanted) {
                    (false, true) => to_install.push(*package),
                    (true, false) => to_remove.push(*package),
                    _ => {}
                }
            }

            E2eError::check(to_install.is_empty() && to_remove.is_empty(), || {
                format!(
                    "packages to be installed: {:?}\npackages to be removed: {:?}",
                    to_install, to_remove
                )
            })
        }
        .await;
        shell.finish(result).await
    }
}

/// `$SESSION`, `$SESSIONDIR` and `$RESULTSDIR` are set inside the container
pub struct SessionEnvironment;

#[async_trait]
impl Scenario for SessionEnvironment {
    fn name(&self) -> &str {
        "test_environment_session"
    }

    fn class(&self) -> &str {
        "TestContainerConfig"
    }

    fn tags(&self) -> &[&str] {
        &["container", "environment"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let mut shell = SessionShell::open(ctx.hub(), REGISTERED_ROLE, None).await?;
        let result = async {
            let session = shell.ws.output("echo $SESSION").await?;
            let number = first_integer(&session).filter(|n| session.trim() == n.to_string());
            E2eError::check(matches!(number, Some(n) if n > 0), || {
                format!("$SESSION is not a positive number: '{}'", session.trim())
            })?;

            let sessiondir = shell.ws.output("echo $SESSIONDIR").await?;
            let sessiondir = sessiondir.trim();
            E2eError::check(!sessiondir.is_empty(), || "$SESSIONDIR is empty".to_string())?;
            let is_dir = shell.ws.bash_test(&format!("-d {}", sessiondir)).await?;
            E2eError::check(is_dir, || format!("$SESSIONDIR is not a directory: {}", sessiondir))?;

            // only populated, the directory appears once a rappture tool runs
            let resultsdir = shell.ws.output("echo $RESULTSDIR").await?;
            E2eError::check(!resultsdir.trim().is_empty(), || "$RESULTSDIR is empty".to_string())?;

            for var in ["HOME", "PATH"] {
                let value = shell.ws.output(&format!("echo ${}", var)).await?;
                E2eError::check(!value.trim().is_empty(), || format!("${} is empty", var))?;
            }
            Ok(())
        }
        .await;
        shell.finish(result).await
    }
}

/// A script resolves to its current location and no old copies remain
pub struct ScriptPath {
    name: &'static str,
    script: &'static str,
    current: &'static str,
    old: &'static [&'static str],
}

#[async_trait]
impl Scenario for ScriptPath {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        "TestContainerConfig"
    }

    fn tags(&self) -> &[&str] {
        &["container", "paths"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let mut shell = SessionShell::open(ctx.hub(), REGISTERED_ROLE, None).await?;
        let result = async {
            let (found, _) = shell.ws.execute_unchecked(&format!("which {}", self.script)).await?;
            let found = found.trim();
            E2eError::check(!found.is_empty(), || {
                format!("'{}' not in search path", self.script)
            })?;
            E2eError::check(found == self.current, || {
                format!("'{}' calls '{}' instead of '{}'", self.script, found, self.current)
            })?;

            let mut leftovers = Vec::new();
            for path in self.old {
                if shell.ws.bash_test(&format!("-e {}", path)).await? {
                    leftovers.push(*path);
                }
            }
            E2eError::check(leftovers.is_empty(), || {
                format!("old locations of {} found: {:?}", self.script, leftovers)
            })
        }
        .await;
        shell.finish(result).await
    }
}
