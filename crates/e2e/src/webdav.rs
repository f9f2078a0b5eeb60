//! WebDAV login checks

use std::time::Duration;

use reqwest::{Method, StatusCode};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// Client for the hub's `/webdav` collection
pub struct WebdavClient {
    url: String,
    client: reqwest::Client,
}

impl WebdavClient {
    /// `https://<host>/webdav`
    pub fn for_host(host: &str) -> E2eResult<Self> {
        Self::new(format!("https://{}/webdav", host))
    }

    pub fn new(url: impl Into<String>) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// PROPFIND the collection root as `username`
    ///
    /// 401 and 403 mean the credentials were refused; any other
    /// non-success status is a plain WebDAV failure.
    pub async fn validate(&self, username: &str, password: &str) -> E2eResult<()> {
        let propfind = Method::from_bytes(b"PROPFIND")
            .map_err(|e| E2eError::Setup(format!("bad method: {}", e)))?;

        debug!("PROPFIND {} as {}", self.url, username);
        let resp = self
            .client
            .request(propfind, &self.url)
            .basic_auth(username, Some(password))
            .header("Depth", "0")
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(E2eError::Unauthorized(username.to_string()))
            }
            status if status.is_success() => {
                info!("WebDAV login as {} accepted ({})", username, status);
                Ok(())
            }
            status => Err(E2eError::Webdav {
                url: self.url.clone(),
                status: status.as_u16(),
            }),
        }
    }
}
