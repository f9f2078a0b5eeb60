//! Process transports for container shells
//!
//! Interactive shells are long-lived child processes whose stdin takes
//! command lines and whose stdout is read line by line. One-shot commands
//! run to completion and return their captured output.

use std::os::unix::fs::PermissionsExt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::config::SshConfig;
use crate::error::{E2eError, E2eResult};

/// Who to connect as and what to run on login
#[derive(Clone)]
pub struct Target {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Remote command for an interactive shell, e.g. `session 1234`
    pub command: Option<String>,
}

impl Target {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            command: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// Output of a one-shot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandOutput {
    pub fn from_output(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code().unwrap_or(-1),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// A line oriented interactive shell
#[async_trait]
pub trait ShellChannel: Send {
    async fn send_line(&mut self, line: &str) -> E2eResult<()>;

    /// Next output line without its line ending, `None` once the remote
    /// side has closed
    async fn read_line(&mut self) -> E2eResult<Option<String>>;

    /// Interrupt the foreground command, where the channel supports it
    async fn interrupt(&mut self) -> E2eResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()>;
}

/// Opens shells and runs commands on a hub
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open_shell(&self, target: &Target) -> E2eResult<Box<dyn ShellChannel>>;

    async fn run(&self, target: &Target, command: &str, timeout: Duration) -> E2eResult<CommandOutput>;
}

/// Shell backed by a child process
pub struct ProcessChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    pty: bool,
    _scratch: Option<TempDir>,
}

impl ProcessChannel {
    fn spawn(mut cmd: Command, pty: bool, scratch: Option<TempDir>) -> E2eResult<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Setup("child has no stdout".to_string()))?;
        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            pty,
            _scratch: scratch,
        })
    }

    async fn write(&mut self, bytes: &[u8]) -> E2eResult<()> {
        let stdin = self.stdin.as_mut().ok_or(E2eError::ConnectionClosed)?;
        let result = async {
            stdin.write_all(bytes).await?;
            stdin.flush().await
        }
        .await;
        result.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => E2eError::ConnectionClosed,
            _ => E2eError::Io(e),
        })
    }
}

#[async_trait]
impl ShellChannel for ProcessChannel {
    async fn send_line(&mut self, line: &str) -> E2eResult<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.write(&bytes).await
    }

    async fn read_line(&mut self) -> E2eResult<Option<String>> {
        let line = self.lines.next_line().await?;
        Ok(line.map(|l| l.trim_end_matches('\r').to_string()))
    }

    async fn interrupt(&mut self) -> E2eResult<()> {
        if self.pty {
            self.write(&[0x03]).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.stdin.is_some() {
            let _ = self.send_line("exit").await;
        }
        self.stdin.take();
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(Ok(status)) => debug!("Shell exited: {}", status),
            Ok(Err(e)) => warn!("Waiting on shell failed: {}", e),
            Err(_) => {
                warn!("Shell did not exit, killing it");
                let _ = self.child.kill().await;
            }
        }
        Ok(())
    }
}

/// ssh to the hub, authenticating with the account password through an
/// askpass helper
#[derive(Debug, Clone)]
pub struct SshTransport {
    config: SshConfig,
}

const ASKPASS_ENV: &str = "HUBCHECK_SSH_PASSWORD";

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn askpass_dir() -> E2eResult<TempDir> {
        let dir = tempfile::Builder::new().prefix("hubcheck-askpass").tempdir()?;
        let script = dir.path().join("askpass.sh");
        std::fs::write(&script, format!("#!/bin/sh\nprintf '%s\\n' \"${}\"\n", ASKPASS_ENV))?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o700))?;
        Ok(dir)
    }

    fn command(&self, target: &Target, askpass: &TempDir, interactive: bool) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        if interactive {
            cmd.arg("-tt");
        }
        for opt in &self.config.options {
            cmd.arg("-o").arg(opt);
        }
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.connect_timeout_secs))
            .arg("-o")
            .arg("NumberOfPasswordPrompts=1")
            .arg(format!("{}@{}", target.username, target.host));
        cmd.env("SSH_ASKPASS", askpass.path().join("askpass.sh"))
            .env("SSH_ASKPASS_REQUIRE", "force")
            .env("DISPLAY", ":0")
            .env(ASKPASS_ENV, &target.password);
        cmd
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open_shell(&self, target: &Target) -> E2eResult<Box<dyn ShellChannel>> {
        debug!("Opening shell: {:?}", target);
        let askpass = Self::askpass_dir()?;
        let mut cmd = self.command(target, &askpass, true);
        if let Some(remote) = &target.command {
            cmd.arg(remote);
        }
        let channel = ProcessChannel::spawn(cmd, true, Some(askpass))?;
        Ok(Box::new(channel))
    }

    async fn run(&self, target: &Target, command: &str, timeout: Duration) -> E2eResult<CommandOutput> {
        debug!("Running on {}: {}", target.host, command);
        let askpass = Self::askpass_dir()?;
        let mut cmd = self.command(target, &askpass, false);
        cmd.arg(command).stdin(Stdio::null()).kill_on_drop(true);

        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(output) => {
                let output = CommandOutput::from_output(output?);
                // ssh reports its own failures as 255
                if output.status == 255 {
                    warn!("ssh to {} failed: {}", target.host, output.stderr.trim());
                    return Err(E2eError::ConnectionClosed);
                }
                Ok(output)
            }
            Err(_) => Err(E2eError::CommandTimeout {
                command: command.to_string(),
                timeout,
            }),
        }
    }
}

/// Local `bash` processes standing in for container shells
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    workdir: Option<std::path::PathBuf>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start every shell in `dir`
    pub fn in_dir(dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            workdir: Some(dir.into()),
        }
    }

    fn bash(&self) -> Command {
        let mut cmd = Command::new("bash");
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn open_shell(&self, _target: &Target) -> E2eResult<Box<dyn ShellChannel>> {
        let mut cmd = self.bash();
        cmd.args(["--norc", "--noprofile"]);
        let mut channel = ProcessChannel::spawn(cmd, false, None)?;
        channel.send_line("exec 2>&1").await?;
        Ok(Box::new(channel))
    }

    async fn run(&self, _target: &Target, command: &str, timeout: Duration) -> E2eResult<CommandOutput> {
        let mut cmd = self.bash();
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(output) => Ok(CommandOutput::from_output(output?)),
            Err(_) => Err(E2eError::CommandTimeout {
                command: command.to_string(),
                timeout,
            }),
        }
    }
}
