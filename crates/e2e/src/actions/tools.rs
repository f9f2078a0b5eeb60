//! Launching tools from the website

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::actions::account;
use crate::browser::{self, navigation_error};
use crate::catalog::{Catalog, GenericPage};
use crate::error::{E2eError, E2eResult};

static SESSION_URL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"/session/(\d+)").ok());

/// Url that launches `revision` of a tool, passing `parameters` through
/// the `params` query argument
pub fn invoke_url(
    https_authority: &str,
    toolname: &str,
    revision: &str,
    parameters: &str,
    add_empty_params: bool,
) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(parameters.as_bytes()).collect();
    let mut url = format!("{}/tools/{}/invoke/{}", https_authority, toolname, revision);
    if !encoded.is_empty() || add_empty_params {
        url.push_str("?params=");
        url.push_str(&encoded);
    }
    url
}

pub fn session_number_from_url(url: &str) -> Option<u64> {
    SESSION_URL_RE.as_ref()?.captures(url)?[1].parse().ok()
}

/// Log in, launch a tool with parameters and return the new session number
///
/// The launch counts as failed when the page load failed, when the page
/// shows a "bad parameters" box (those pages load with status 200) or when
/// the middleware bounced back with an invoke error.
pub async fn launch_tool_with_parameters(
    catalog: &Catalog,
    username: &str,
    password: &str,
    toolname: &str,
    revision: &str,
    parameters: &str,
    add_empty_params: bool,
) -> E2eResult<u64> {
    account::login_as(catalog, username, password).await?;

    let url = invoke_url(
        &catalog.urls().https_authority,
        toolname,
        revision,
        parameters,
        add_empty_params,
    );
    info!("Launching {} ({})", toolname, revision);

    let b = catalog.browser();
    b.new_har("page link").await?;
    b.get(&url).await?;
    if let Some(entry) = b.page_load_details(None).await? {
        if browser::error_loading_page(&entry) {
            // the container may have started anyway; callers reconcile sessions
            warn!("Launch of {} returned status {}", toolname, entry.status());
            return Err(navigation_error(&url, &entry));
        }
    }

    let page = catalog.load::<GenericPage>(());
    for message in page.error_box_messages().await? {
        if message.to_lowercase().contains("bad parameters") {
            return Err(E2eError::BadParameters {
                url,
                message: message.trim().to_string(),
            });
        }
    }
    if let Some(message) = page.invoke_error().await? {
        return Err(E2eError::SessionInvoke(message.trim().to_string()));
    }

    let current = b.current_url().await?;
    session_number_from_url(&current).ok_or_else(|| {
        E2eError::SessionInvoke(format!("no session number in {}", current))
    })
}
