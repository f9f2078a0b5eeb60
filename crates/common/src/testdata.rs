//! Test accounts, target urls and page locators
//!
//! The test data file is YAML, optionally sealed with a password (see
//! [`crate::seal`]). It is loaded once per run and handed to fixtures
//! explicitly; nothing here is global.
//!
//! ```yaml
//! urls:
//!   https: hub.example.org
//!   httpsport: 443
//!   http: hub.example.org
//!   httpport: 80
//!   webdav: hub.example.org
//! accounts:
//!   - username: hcmanager
//!     password: secret
//!     roles: [toolmanager]
//!     groups: [apps]
//! locators:
//!   GenericPage:
//!     logout: "a.logout"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::seal;

/// Page name -> element name -> css selector
pub type LocatorTable = BTreeMap<String, BTreeMap<String, String>>;

/// A test account on the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAccount {
    pub username: String,
    pub password: String,

    /// Role tags such as `toolmanager` or `registeredworkspace`
    #[serde(default)]
    pub roles: Vec<String>,

    /// Unix groups the account belongs to inside containers
    #[serde(default)]
    pub groups: Vec<String>,
}

impl TestAccount {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// A url entry: either a host name or a port number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlValue {
    Port(u16),
    Text(String),
}

impl UrlValue {
    pub fn as_port(&self) -> Option<u16> {
        match self {
            UrlValue::Port(p) => Some(*p),
            UrlValue::Text(t) => t.trim().parse().ok(),
        }
    }
}

impl fmt::Display for UrlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlValue::Port(p) => write!(f, "{}", p),
            UrlValue::Text(t) => f.write_str(t),
        }
    }
}

/// The full test data set for one hub
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Testdata {
    #[serde(default)]
    pub urls: BTreeMap<String, UrlValue>,

    #[serde(default)]
    pub accounts: Vec<TestAccount>,

    #[serde(default)]
    pub locators: LocatorTable,
}

impl Testdata {
    /// Parse plain YAML test data
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    /// Load test data from disk, opening it with `password` when sealed
    pub fn load(path: &Path, password: Option<&str>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let plain = if seal::is_sealed(&bytes) {
            let password = password.ok_or_else(|| {
                Error::Seal(format!("{} is sealed and no password was given", path.display()))
            })?;
            seal::open(&bytes, password)?
        } else {
            bytes
        };

        let text = String::from_utf8(plain)
            .map_err(|e| Error::Seal(format!("test data is not utf-8: {}", e)))?;
        let data = Self::from_yaml(&text)?;
        debug!(
            "Loaded test data: {} accounts, {} urls",
            data.accounts.len(),
            data.urls.len()
        );
        Ok(data)
    }

    /// Username and password of the first account tagged with `role`
    pub fn find_account_for(&self, role: &str) -> Result<(&str, &str)> {
        self.accounts
            .iter()
            .find(|a| a.has_role(role))
            .map(|a| (a.username.as_str(), a.password.as_str()))
            .ok_or_else(|| Error::NoAccountForRole(role.to_string()))
    }

    /// Every account tagged with `role`
    pub fn find_accounts_for(&self, role: &str) -> Vec<&TestAccount> {
        self.accounts.iter().filter(|a| a.has_role(role)).collect()
    }

    pub fn find_url_for(&self, key: &str) -> Result<&UrlValue> {
        self.urls
            .get(key)
            .ok_or_else(|| Error::NoUrlFor(key.to_string()))
    }

    pub fn find_port_for(&self, key: &str) -> Result<u16> {
        let value = self.find_url_for(key)?;
        value.as_port().ok_or_else(|| Error::NotAPort {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn get_usernames(&self) -> Vec<&str> {
        self.accounts.iter().map(|a| a.username.as_str()).collect()
    }

    pub fn get_userdata_for(&self, username: &str) -> Result<&TestAccount> {
        self.accounts
            .iter()
            .find(|a| a.username == username)
            .ok_or_else(|| Error::NoSuchAccount(username.to_string()))
    }

    pub fn get_locators(&self) -> &LocatorTable {
        &self.locators
    }
}

/// Scheme authorities derived from the test data urls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubUrls {
    pub https_uri: String,
    pub https_port: u16,
    pub https_authority: String,
    pub http_uri: String,
    pub http_port: u16,
    pub http_authority: String,
}

impl HubUrls {
    pub fn from_testdata(testdata: &Testdata) -> Result<Self> {
        let https_uri = testdata.find_url_for("https")?.to_string();
        let https_port = testdata.find_port_for("httpsport")?;
        let http_uri = testdata.find_url_for("http")?.to_string();
        let http_port = testdata.find_port_for("httpport")?;

        Ok(Self::new(https_uri, https_port, http_uri, http_port))
    }

    pub fn new(https_uri: String, https_port: u16, http_uri: String, http_port: u16) -> Self {
        let https_authority = if https_port == 443 {
            format!("https://{}", https_uri)
        } else {
            format!("https://{}:{}", https_uri, https_port)
        };
        let http_authority = if http_port == 80 {
            format!("http://{}", http_uri)
        } else {
            format!("http://{}:{}", http_uri, http_port)
        };

        Self {
            https_uri,
            https_port,
            https_authority,
            http_uri,
            http_port,
            http_authority,
        }
    }
}
