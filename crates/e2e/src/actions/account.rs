//! Logging in and out of the hub

use tracing::{info, warn};

use crate::catalog::{Catalog, GenericPage, LoginPage};
use crate::error::{E2eError, E2eResult};

/// Log in through the login page
///
/// A browser holds one identity at a time, so whoever is logged in is
/// logged out first.
pub async fn login_as(catalog: &Catalog, username: &str, password: &str) -> E2eResult<()> {
    let page = catalog.goto::<LoginPage>(()).await?;

    let header = catalog.load::<GenericPage>(());
    if header.is_logged_in().await? {
        warn!("Already logged in, logging out before logging in as {}", username);
        header.goto_logout().await?;
        catalog.goto::<LoginPage>(()).await?;
    }

    info!("Logging in as {}", username);
    page.login(username, password).await?;

    if let Some(message) = page.error_message().await? {
        return Err(E2eError::AssertionFailed(format!(
            "login as {} failed: {}",
            username,
            message.trim()
        )));
    }
    Ok(())
}

pub async fn is_logged_in(catalog: &Catalog) -> E2eResult<bool> {
    catalog.load::<GenericPage>(()).is_logged_in().await
}

/// Log out if logged in
pub async fn logout(catalog: &Catalog) -> E2eResult<()> {
    let header = catalog.load::<GenericPage>(());
    if header.is_logged_in().await? {
        info!("Logging out");
        header.goto_logout().await?;
    }
    Ok(())
}
