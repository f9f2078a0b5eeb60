//! The contribtool pipeline pages

use hubcheck_common::{ToolData, ToolState};
use tracing::info;

use crate::catalog::{Catalog, GenericPage, ToolRegisterPage, ToolStatusAdminPage};
use crate::error::{E2eError, E2eResult};

/// Open the tool's status page; a navigation error means the hub does not
/// know the tool
pub async fn goto_tool_status_page(
    catalog: &Catalog,
    toolname: &str,
    state: ToolState,
) -> E2eResult<ToolStatusAdminPage> {
    catalog
        .goto::<ToolStatusAdminPage>((toolname.to_string(), state))
        .await
}

/// Fill out and submit the tool registration form
pub async fn register(catalog: &Catalog, toolname: &str, data: &ToolData) -> E2eResult<()> {
    info!("Registering tool {}", toolname);
    let page = catalog.goto::<ToolRegisterPage>(()).await?;
    page.register(toolname, data).await?;

    let errors = catalog.load::<GenericPage>(()).error_box_messages().await?;
    if !errors.is_empty() {
        return Err(E2eError::AssertionFailed(format!(
            "registering {} failed: {}",
            toolname,
            errors.join("; ")
        )));
    }
    Ok(())
}
