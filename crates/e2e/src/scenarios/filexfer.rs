//! Moving files between a tool session container and the browser with
//! `exportfile` and `importfile`

use std::io::Write;

use async_trait::async_trait;
use hubcheck_common::parse;
use tokio::time::Instant;
use tracing::debug;

use crate::actions::account;
use crate::catalog::{FilexferExportfilePage, FilexferImportfilePage};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::SharedResources;
use crate::runner::{Scenario, TestContext};
use crate::scenarios::{SessionShell, PURDUE_ROLE};

const TRANSFER_FILE: &str = "hcfxf.txt";

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(ExportTextFile),
        Box::new(ImportText { from_file: false }),
        Box::new(ImportText { from_file: true }),
    ]
}

/// The newest log in a `ls -tr` listing
pub fn newest_log(listing: &str) -> Option<&str> {
    listing.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// Timestamp written into the transferred file
fn marker() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Url tail the newest filexfer server asked the browser to open
async fn clientaction_tail(shell: &mut SessionShell) -> E2eResult<Option<String>> {
    let (listing, _) = shell
        .ws
        .execute_unchecked("ls -tr $SESSIONDIR/filexfer*.log 2>/dev/null")
        .await?;
    let Some(log) = newest_log(&listing) else {
        return Ok(None);
    };
    let (lines, _) = shell
        .ws
        .execute_unchecked(&format!("grep \"/usr/bin/clientaction url\" {}", log))
        .await?;
    Ok(parse::clientaction_urls(&lines).pop())
}

/// Wait for the filexfer server to name its page
async fn wait_for_clientaction(hub: &SharedResources, shell: &mut SessionShell) -> E2eResult<String> {
    let poll = hub.settings.session_poll();
    let give_up = Instant::now() + poll.deadline;
    loop {
        if let Some(tail) = clientaction_tail(shell).await? {
            debug!("filexfer page at {}", tail);
            return Ok(tail);
        }
        if Instant::now() + poll.interval > give_up {
            return Err(E2eError::AssertionFailed(
                "no filexfer log names a clientaction url".to_string(),
            ));
        }
        tokio::time::sleep(poll.interval).await;
    }
}

/// Wait for the filexfer server to write an uploaded file
async fn wait_for_file(hub: &SharedResources, shell: &mut SessionShell, path: &str) -> E2eResult<()> {
    let poll = hub.settings.session_poll();
    let give_up = Instant::now() + poll.deadline;
    while !shell.ws.bash_test(&format!("-s {}", path)).await? {
        if Instant::now() + poll.interval > give_up {
            return Err(E2eError::AssertionFailed(format!(
                "imported file {} never appeared in the tool session container",
                path
            )));
        }
        tokio::time::sleep(poll.interval).await;
    }
    Ok(())
}

/// Open a session shell and log the browser into the same account
async fn open(hub: &SharedResources) -> E2eResult<SessionShell> {
    let (username, password) = hub.account_for(PURDUE_ROLE)?;
    let shell = SessionShell::open(hub, PURDUE_ROLE, None).await?;
    hub.browser.get(&hub.urls.https_authority).await?;
    if let Err(e) = account::login_as(&hub.catalog, &username, &password).await {
        return shell.finish(Err(e)).await;
    }
    Ok(shell)
}

fn compare(direction: &str, expected: &str, received: &str) -> E2eResult<()> {
    E2eError::check(expected == received, || {
        format!(
            "{} data does not match file data in tool session container: expected: \"{}\" received: \"{}\"",
            direction, expected, received
        )
    })
}

/// exportfile hands a container file to the browser
pub struct ExportTextFile;

#[async_trait]
impl Scenario for ExportTextFile {
    fn name(&self) -> &str {
        "test_exportfile_text_file"
    }

    fn class(&self) -> &str {
        "TestFilexfer"
    }

    fn tags(&self) -> &[&str] {
        &["website", "container", "filexfer", "exportfile"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let mut shell = open(hub).await?;
        let result = async {
            let expected = marker();
            let path = shell.put(TRANSFER_FILE, expected.as_str(), Some(0o600)).await?;
            shell.ws.execute(&format!("exportfile {}", path)).await?;

            let tail = wait_for_clientaction(hub, &mut shell).await?;
            let page = hub.catalog.goto::<FilexferExportfilePage>(tail).await?;
            let received = page.file_text().await?;
            compare("exported", &expected, received.trim_end())
        }
        .await;
        shell.finish(result).await
    }
}

/// importfile takes text typed or uploaded in the browser into the container
pub struct ImportText {
    from_file: bool,
}

#[async_trait]
impl Scenario for ImportText {
    fn name(&self) -> &str {
        if self.from_file {
            "test_importfile_text_file"
        } else {
            "test_importfile_text"
        }
    }

    fn class(&self) -> &str {
        "TestFilexfer"
    }

    fn tags(&self) -> &[&str] {
        &["website", "container", "filexfer", "importfile"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let mut shell = open(hub).await?;
        let result = async {
            let expected = marker();
            let path = shell.path(TRANSFER_FILE);
            shell.remove_on_finish(path.clone());
            shell.ws.execute(&format!("importfile {} &", path)).await?;

            let tail = wait_for_clientaction(hub, &mut shell).await?;
            let page = hub.catalog.goto::<FilexferImportfilePage>(tail).await?;
            if self.from_file {
                let mut local = tempfile::Builder::new().suffix(".tmp").tempfile()?;
                local.write_all(expected.as_bytes())?;
                local.flush()?;
                page.upload_file(local.path()).await?;
            } else {
                page.upload_text(&expected).await?;
            }

            wait_for_file(hub, &mut shell, &path).await?;
            let received = shell.ws.read_file(&path).await?;
            compare("imported", &expected, &received)
        }
        .await;
        shell.finish(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", None ; "no logs")]
    #[test_case("/s/filexfer1.log\n", Some("/s/filexfer1.log") ; "one log")]
    #[test_case("/s/filexfer1.log\n/s/filexfer7.log\n\n", Some("/s/filexfer7.log") ; "newest is last")]
    fn test_newest_log(listing: &str, expected: Option<&str>) {
        assert_eq!(newest_log(listing), expected);
    }

    #[test]
    fn test_marker_is_a_timestamp() {
        let marker = marker();
        assert!(chrono::NaiveDateTime::parse_from_str(&marker, "%Y-%m-%d %H:%M:%S").is_ok());
    }

    #[test]
    fn test_filexfer_scenarios_share_one_class() {
        let scenarios = scenarios();
        assert_eq!(scenarios.len(), 3);
        assert!(scenarios.iter().all(|s| s.class() == "TestFilexfer"));
        assert!(scenarios.iter().all(|s| s.tags().contains(&"filexfer")));
    }
}
