//! Command execution inside a container shell
//!
//! Every command is followed by a `printf` of a per-command marker and the
//! command's exit status. Output is whatever arrives before the marker.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::shell::container::SessionLease;
use crate::shell::transport::ShellChannel;

/// Base64 characters per upload line; stays under the tty line limit
const UPLOAD_CHUNK: usize = 3000;

/// Content for [`Workspace::importfile`]
#[derive(Debug, Clone)]
pub enum ImportSource {
    Data(Vec<u8>),
    LocalPath(PathBuf),
}

impl From<&str> for ImportSource {
    fn from(data: &str) -> Self {
        ImportSource::Data(data.as_bytes().to_vec())
    }
}

impl From<String> for ImportSource {
    fn from(data: String) -> Self {
        ImportSource::Data(data.into_bytes())
    }
}

impl From<PathBuf> for ImportSource {
    fn from(path: PathBuf) -> Self {
        ImportSource::LocalPath(path)
    }
}

pub(crate) fn quote(s: &str) -> String {
    shell_escape::escape(Cow::Borrowed(s)).into_owned()
}

/// A command handle into one container session
pub struct Workspace {
    channel: Option<Box<dyn ShellChannel>>,
    host: String,
    username: String,
    session_number: Option<u64>,
    timeout: Duration,
    pending_marker: Option<String>,
    shell_depth: usize,
    lease: Option<SessionLease>,
}

impl Workspace {
    /// Wrap an open channel and wait for the shell to answer
    pub async fn attach(
        channel: Box<dyn ShellChannel>,
        host: impl Into<String>,
        username: impl Into<String>,
        timeout: Duration,
    ) -> E2eResult<Self> {
        let mut ws = Self {
            channel: Some(channel),
            host: host.into(),
            username: username.into(),
            session_number: None,
            timeout,
            pending_marker: None,
            shell_depth: 0,
            lease: None,
        };
        ws.prepare_shell().await?;
        Ok(ws)
    }

    pub(crate) fn with_lease(mut self, session_number: u64, lease: SessionLease) -> Self {
        self.session_number = Some(session_number);
        self.lease = Some(lease);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn session_number(&self) -> Option<u64> {
        self.session_number
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    fn channel(&mut self) -> E2eResult<&mut Box<dyn ShellChannel>> {
        self.channel.as_mut().ok_or(E2eError::ConnectionClosed)
    }

    /// Quiet the prompt and echo, then sync on a marker
    async fn prepare_shell(&mut self) -> E2eResult<()> {
        self.channel()?
            .send_line("stty -echo 2>/dev/null; export PS1='' PS2=''; unset PROMPT_COMMAND")
            .await?;
        let timeout = self.timeout;
        self.run_marked(":", timeout).await?;
        Ok(())
    }

    async fn collect_until(&mut self, marker: &str) -> E2eResult<(Vec<String>, i32)> {
        let channel = self.channel()?;
        let mut lines = Vec::new();
        loop {
            let Some(line) = channel.read_line().await? else {
                return Err(E2eError::ConnectionClosed);
            };
            if let Some(rest) = line.strip_prefix(marker) {
                if let Ok(status) = rest.trim().parse::<i32>() {
                    return Ok((lines, status));
                }
            }
            lines.push(line);
        }
    }

    /// Wait out a command that timed out earlier
    async fn drain_pending(&mut self) -> E2eResult<()> {
        let Some(marker) = self.pending_marker.take() else {
            return Ok(());
        };
        debug!("Draining timed out command before continuing");
        self.channel()?.interrupt().await?;
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.collect_until(&marker)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => {
                self.pending_marker = Some(marker);
                Err(E2eError::CommandTimeout {
                    command: "(previous command still running)".to_string(),
                    timeout,
                })
            }
        }
    }

    async fn run_marked(&mut self, command: &str, timeout: Duration) -> E2eResult<(String, i32)> {
        self.drain_pending().await?;

        let marker = format!("__HUBCHECK_{}__", uuid::Uuid::new_v4().simple());
        let channel = self.channel()?;
        channel.send_line(command).await?;
        channel
            .send_line(&format!("printf '\\n%s%d\\n' {} $?", marker))
            .await?;

        match tokio::time::timeout(timeout, self.collect_until(&marker)).await {
            Ok(Ok((lines, status))) => {
                let output = lines.join("\n").trim_end_matches(['\n', '\r']).to_string();
                Ok((output, status))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.pending_marker = Some(marker);
                Err(E2eError::CommandTimeout {
                    command: command.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Run `command`, failing on a non-zero exit status
    pub async fn execute(&mut self, command: &str) -> E2eResult<(String, i32)> {
        let (output, status) = self.execute_unchecked(command).await?;
        if status != 0 {
            return Err(E2eError::CommandFailed {
                command: command.to_string(),
                status,
                output,
            });
        }
        Ok((output, status))
    }

    /// Run `command` and hand back its status whatever it is
    pub async fn execute_unchecked(&mut self, command: &str) -> E2eResult<(String, i32)> {
        debug!("[{}@{}] {}", self.username, self.host, command);
        let timeout = self.timeout;
        self.run_marked(command, timeout).await
    }

    /// Output of a successful command
    pub async fn output(&mut self, command: &str) -> E2eResult<String> {
        Ok(self.execute(command).await?.0)
    }

    /// Run with a one-off timeout; the handle's timeout is restored after
    pub async fn execute_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
        fail_on_exit_code: bool,
    ) -> E2eResult<(String, i32)> {
        let previous = self.timeout;
        self.timeout = timeout;
        let result = if fail_on_exit_code {
            self.execute(command).await
        } else {
            self.execute_unchecked(command).await
        };
        self.timeout = previous;
        result
    }

    /// Run each command in order, stopping at the first failure
    pub async fn execute_all<S: AsRef<str>>(&mut self, commands: &[S]) -> E2eResult<Vec<String>> {
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            outputs.push(self.execute(command.as_ref()).await?.0);
        }
        Ok(outputs)
    }

    /// Write `content` to `path` inside the container
    pub async fn write_file(&mut self, path: &str, content: impl AsRef<[u8]>) -> E2eResult<()> {
        let encoded = BASE64.encode(content.as_ref());
        let target = quote(path);
        self.execute(&format!(": > {}", target)).await?;
        for chunk in encoded.as_bytes().chunks(UPLOAD_CHUNK) {
            let chunk = std::str::from_utf8(chunk)
                .map_err(|e| E2eError::Setup(format!("bad base64 chunk: {}", e)))?;
            self.execute(&format!("printf '%s' '{}' | base64 -d >> {}", chunk, target))
                .await?;
        }
        Ok(())
    }

    pub async fn read_file_bytes(&mut self, path: &str) -> E2eResult<Vec<u8>> {
        let encoded = self.output(&format!("base64 {}", quote(path))).await?;
        let joined: String = encoded.split_whitespace().collect();
        BASE64
            .decode(joined.as_bytes())
            .map_err(|e| E2eError::Setup(format!("cannot decode {}: {}", path, e)))
    }

    pub async fn read_file(&mut self, path: &str) -> E2eResult<String> {
        let bytes = self.read_file_bytes(path).await?;
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }

    /// Upload data or a local file to `remote_path`, optionally setting its mode
    pub async fn importfile(
        &mut self,
        source: impl Into<ImportSource>,
        remote_path: &str,
        mode: Option<u32>,
    ) -> E2eResult<()> {
        let data = match source.into() {
            ImportSource::Data(data) => data,
            ImportSource::LocalPath(path) => std::fs::read(&path)?,
        };
        self.write_file(remote_path, data).await?;
        if let Some(mode) = mode {
            self.chmod(remote_path, mode).await?;
        }
        Ok(())
    }

    pub async fn chmod(&mut self, path: &str, mode: u32) -> E2eResult<()> {
        self.execute(&format!("chmod {:o} {}", mode, quote(path))).await?;
        Ok(())
    }

    pub async fn remove_file(&mut self, path: &str) -> E2eResult<()> {
        self.execute(&format!("rm -f {}", quote(path))).await?;
        Ok(())
    }

    /// Evaluate a bash conditional expression, e.g. `-r /etc/passwd`
    pub async fn bash_test(&mut self, expression: &str) -> E2eResult<bool> {
        let out = self
            .output(&format!("[[ {} ]] && echo 1 || echo 0", expression))
            .await?;
        Ok(out.trim() == "1")
    }

    /// Send a raw line with no status tracking
    pub async fn send(&mut self, line: &str) -> E2eResult<()> {
        self.channel()?.send_line(line).await
    }

    /// Start a nested bash, e.g. after a privilege switch
    pub async fn start_bash_shell(&mut self) -> E2eResult<()> {
        self.send("exec 2>&1; bash --norc --noprofile").await?;
        self.shell_depth += 1;
        self.prepare_shell().await
    }

    /// Leave the innermost nested shell
    pub async fn stop_bash_shell(&mut self) -> E2eResult<()> {
        if self.shell_depth == 0 {
            return Err(E2eError::Setup("no nested shell to stop".to_string()));
        }
        self.send("exit").await?;
        self.shell_depth -= 1;
        let timeout = self.timeout;
        self.run_marked(":", timeout).await?;
        Ok(())
    }

    /// `su` to `username`; the password is typed at the prompt
    pub async fn switch_user(&mut self, username: &str, password: &str) -> E2eResult<()> {
        self.send(&format!("su {}", quote(username))).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.send(password).await?;
        self.shell_depth += 1;
        self.prepare_shell().await?;

        let who = self.output("whoami").await?;
        E2eError::check(who.trim() == username, || {
            format!("switched to '{}', whoami says '{}'", username, who.trim())
        })
    }

    pub async fn exit_user(&mut self) -> E2eResult<()> {
        self.stop_bash_shell().await
    }

    /// Tear down the transport and release the session handle
    ///
    /// Safe to call more than once; errors while exiting are logged.
    pub async fn close(&mut self) -> E2eResult<()> {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                warn!("Closing shell for {}@{} failed: {}", self.username, self.host, e);
            }
        }
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // the channel's process is killed when it drops
        self.channel.take();
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
    }
}
