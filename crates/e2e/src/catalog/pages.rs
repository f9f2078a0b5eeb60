//! Page objects for the hub's web interface

use std::path::Path;

use hubcheck_common::parse::{self, PaginationCounts};
use hubcheck_common::{LicenseTerms, ToolData, ToolState};
use tracing::debug;

use crate::browser::FormField;
use crate::catalog::{PageContext, PageId, PageObject};
use crate::error::E2eResult;

macro_rules! page_object {
    ($name:ident, $id:expr, $params:ty, |$ctx:ident, $p:pat_param| $body:expr) => {
        impl PageObject for $name {
            const ID: PageId = $id;
            type Params = $params;

            fn bind($ctx: PageContext, $p: Self::Params) -> Self {
                $body
            }

            fn context(&self) -> &PageContext {
                &self.ctx
            }

            fn path(&self) -> Option<String> {
                self.page_path()
            }
        }
    };
}

/// Header and footer elements present on every page
pub struct GenericPage {
    ctx: PageContext,
}

page_object!(GenericPage, PageId::Generic, (), |ctx, _| GenericPage { ctx });

impl GenericPage {
    fn page_path(&self) -> Option<String> {
        Some("/".to_string())
    }

    pub async fn is_logged_in(&self) -> E2eResult<bool> {
        self.browser().is_displayed(self.locator("logout")?).await
    }

    pub async fn goto_login(&self) -> E2eResult<()> {
        self.browser().click(self.locator("login")?).await
    }

    pub async fn goto_logout(&self) -> E2eResult<()> {
        self.browser().click(self.locator("logout")?).await
    }

    pub async fn goto_register(&self) -> E2eResult<()> {
        self.browser().click(self.locator("register")?).await
    }

    /// Whether the header shows the link named `link` (login, register, ...)
    pub async fn has_link(&self, link: &str) -> E2eResult<bool> {
        self.browser().is_displayed(self.locator(link)?).await
    }

    /// Visible text of the whole page
    pub async fn text(&self) -> E2eResult<String> {
        self.browser().text_of(self.locator("body")?).await
    }

    /// Texts of the error boxes on the page
    pub async fn error_box_messages(&self) -> E2eResult<Vec<String>> {
        self.browser().texts_of(self.locator("errorbox")?).await
    }

    /// Middleware's "Failed to invoke session" style message
    pub async fn invoke_error(&self) -> E2eResult<Option<String>> {
        let selector = self.locator("invokeerror")?;
        if self.browser().is_displayed(selector).await? {
            Ok(Some(self.browser().text_of(selector).await?))
        } else {
            Ok(None)
        }
    }

    /// Open or close the "need help" widget
    pub async fn toggle_need_help(&self) -> E2eResult<()> {
        self.browser().click(self.locator("needhelp")?).await
    }
}

pub struct LoginPage {
    ctx: PageContext,
}

page_object!(LoginPage, PageId::Login, (), |ctx, _| LoginPage { ctx });

impl LoginPage {
    fn page_path(&self) -> Option<String> {
        Some("/login".to_string())
    }

    pub async fn login(&self, username: &str, password: &str) -> E2eResult<()> {
        let fields = [
            FormField::text(self.locator("username")?, username),
            FormField::text(self.locator("password")?, password),
        ];
        self.browser()
            .submit_form(&fields, self.locator("submit")?)
            .await
    }

    pub async fn error_message(&self) -> E2eResult<Option<String>> {
        let error = self.locator("error")?;
        if self.browser().is_displayed(error).await? {
            Ok(Some(self.browser().text_of(error).await?))
        } else {
            Ok(None)
        }
    }
}

pub struct MembersDashboardPage {
    ctx: PageContext,
}

page_object!(MembersDashboardPage, PageId::MembersDashboard, (), |ctx, _| {
    MembersDashboardPage { ctx }
});

impl MembersDashboardPage {
    fn page_path(&self) -> Option<String> {
        Some("/members/myaccount".to_string())
    }

    /// Titles in the "My Sessions" module
    pub async fn session_titles(&self) -> E2eResult<Vec<String>> {
        self.browser().texts_of(self.locator("sessions")?).await
    }
}

/// A running tool session, `/tools/<tool>/session/<n>`
pub struct ToolSessionPage {
    ctx: PageContext,
    toolname: String,
    session_number: u64,
}

page_object!(ToolSessionPage, PageId::ToolSession, (String, u64), |ctx, (toolname, session_number)| {
    ToolSessionPage {
        ctx,
        toolname,
        session_number,
    }
});

impl ToolSessionPage {
    fn page_path(&self) -> Option<String> {
        Some(format!("/tools/{}/session/{}", self.toolname, self.session_number))
    }

    pub fn session_number(&self) -> u64 {
        self.session_number
    }

    pub async fn is_app_displayed(&self) -> E2eResult<bool> {
        self.browser().is_displayed(self.locator("app")?).await
    }

    pub async fn title(&self) -> E2eResult<String> {
        self.browser().text_of(self.locator("title")?).await
    }

    /// Pop the app out into its own window; returns the window handle
    pub async fn do_popout(&self) -> E2eResult<String> {
        self.browser()
            .click_opening_window(self.locator("popout")?)
            .await
    }

    /// Press terminate and accept the confirmation
    pub async fn do_terminate(&self) -> E2eResult<()> {
        debug!("Terminating session {}", self.session_number);
        self.browser().click(self.locator("terminate")?).await?;
        let confirm = self.locator("confirm")?;
        if self.browser().is_displayed(confirm).await? {
            self.browser().click(confirm).await?;
        }
        Ok(())
    }
}

/// The contribtool status page, as seen by a tool manager while the tool
/// is in, or headed for, one pipeline state
pub struct ToolStatusAdminPage {
    ctx: PageContext,
    toolname: String,
    state: ToolState,
}

page_object!(ToolStatusAdminPage, PageId::ToolStatusAdmin, (String, ToolState), |ctx, (toolname, state)| {
    ToolStatusAdminPage { ctx, toolname, state }
});

impl ToolStatusAdminPage {
    fn page_path(&self) -> Option<String> {
        Some(format!("/tools/{}/status", self.toolname))
    }

    pub fn toolname(&self) -> &str {
        &self.toolname
    }

    pub fn target_state(&self) -> ToolState {
        self.state
    }

    pub async fn get_tool_state(&self) -> E2eResult<ToolState> {
        let text = self.browser().text_of(self.locator("state")?).await?;
        Ok(text.parse()?)
    }

    /// Submit the status form with the page's target state
    pub async fn submit_state(&self) -> E2eResult<()> {
        let fields = [FormField::select(self.locator("status")?, self.state.as_str())];
        self.browser()
            .submit_form(&fields, self.locator("submit")?)
            .await
    }
}

/// First Approved confirmation: the tool version
pub struct ApproveConfirmVersionPage {
    ctx: PageContext,
}

page_object!(ApproveConfirmVersionPage, PageId::ApproveConfirmVersion, (), |ctx, _| {
    ApproveConfirmVersionPage { ctx }
});

impl ApproveConfirmVersionPage {
    fn page_path(&self) -> Option<String> {
        None
    }

    pub async fn version(&self) -> E2eResult<String> {
        self.browser().value_of(self.locator("version")?).await
    }

    pub async fn submit_version(&self, version: &str) -> E2eResult<()> {
        let fields = [FormField::text(self.locator("version")?, version)];
        self.browser()
            .submit_form(&fields, self.locator("submit")?)
            .await
    }
}

/// Second Approved confirmation: the license
pub struct ApproveConfirmLicensePage {
    ctx: PageContext,
}

page_object!(ApproveConfirmLicensePage, PageId::ApproveConfirmLicense, (), |ctx, _| {
    ApproveConfirmLicensePage { ctx }
});

impl ApproveConfirmLicensePage {
    fn page_path(&self) -> Option<String> {
        None
    }

    pub async fn submit_license(&self, terms: &LicenseTerms) -> E2eResult<()> {
        let fields = [
            FormField::select(self.locator("sourceaccess")?, &terms.source_access),
            FormField::select(self.locator("templates")?, &terms.templates),
            FormField::text(self.locator("licensetext")?, &terms.license_text),
            FormField::check(self.locator("authorize")?, terms.authorize),
        ];
        self.browser()
            .submit_form(&fields, self.locator("submit")?)
            .await
    }
}

/// Last Approved confirmation: the tool information
pub struct ApproveConfirmToolInfoPage {
    ctx: PageContext,
}

page_object!(ApproveConfirmToolInfoPage, PageId::ApproveConfirmToolInfo, (), |ctx, _| {
    ApproveConfirmToolInfoPage { ctx }
});

impl ApproveConfirmToolInfoPage {
    fn page_path(&self) -> Option<String> {
        None
    }

    pub async fn approve_tool(&self) -> E2eResult<()> {
        self.browser().click(self.locator("approve")?).await
    }
}

pub struct ToolRegisterPage {
    ctx: PageContext,
}

page_object!(ToolRegisterPage, PageId::ToolRegister, (), |ctx, _| ToolRegisterPage { ctx });

impl ToolRegisterPage {
    fn page_path(&self) -> Option<String> {
        Some("/tools/register".to_string())
    }

    pub async fn register(&self, toolname: &str, data: &ToolData) -> E2eResult<()> {
        let mut fields = vec![
            FormField::text(self.locator("toolname")?, toolname),
            FormField::text(self.locator("title")?, &data.title),
            FormField::text(self.locator("version")?, &data.version),
            FormField::text(self.locator("description")?, &data.description),
        ];
        if let Some(geometry) = &data.vnc_geometry {
            fields.push(FormField::select(self.locator("vncgeometry")?, geometry));
        }
        if !data.team.is_empty() {
            fields.push(FormField::text(self.locator("team")?, data.team.join(",")));
        }
        self.browser()
            .submit_form(&fields, self.locator("submit")?)
            .await
    }
}

pub struct TagsBrowsePage {
    ctx: PageContext,
}

page_object!(TagsBrowsePage, PageId::TagsBrowse, (), |ctx, _| TagsBrowsePage { ctx });

impl TagsBrowsePage {
    fn page_path(&self) -> Option<String> {
        Some("/tags".to_string())
    }

    pub fn tag_url(&self, tag: &str) -> String {
        self.ctx.https_url(&format!("/tags/{}", tag))
    }

    pub async fn search(&self, term: &str) -> E2eResult<()> {
        let fields = [FormField::text(self.locator("search")?, term)];
        self.browser()
            .submit_form(&fields, self.locator("searchbutton")?)
            .await
    }

    pub async fn tags(&self) -> E2eResult<Vec<String>> {
        self.browser().texts_of(self.locator("tags")?).await
    }

    pub async fn counts(&self) -> E2eResult<Option<PaginationCounts>> {
        let text = self.browser().text_of(self.locator("counts")?).await?;
        Ok(parse::pagination_counts(&text))
    }
}

/// The upload form a running `importfile` opens in the browser
pub struct FilexferImportfilePage {
    ctx: PageContext,
    url_tail: String,
}

page_object!(FilexferImportfilePage, PageId::FilexferImportfile, String, |ctx, url_tail| {
    FilexferImportfilePage { ctx, url_tail }
});

impl FilexferImportfilePage {
    fn page_path(&self) -> Option<String> {
        Some(self.url_tail.clone())
    }

    pub async fn upload_text(&self, text: &str) -> E2eResult<()> {
        let fields = [FormField::text(self.locator("text")?, text)];
        self.browser()
            .submit_form(&fields, self.locator("submit")?)
            .await
    }

    pub async fn upload_file(&self, path: &Path) -> E2eResult<()> {
        let fields = [FormField::file(self.locator("file")?, path)];
        self.browser()
            .submit_form(&fields, self.locator("submit")?)
            .await
    }
}

/// The download `exportfile` opens in the browser
pub struct FilexferExportfilePage {
    ctx: PageContext,
    url_tail: String,
}

page_object!(FilexferExportfilePage, PageId::FilexferExportfile, String, |ctx, url_tail| {
    FilexferExportfilePage { ctx, url_tail }
});

impl FilexferExportfilePage {
    fn page_path(&self) -> Option<String> {
        Some(self.url_tail.clone())
    }

    pub async fn file_text(&self) -> E2eResult<String> {
        self.browser().text_of(self.locator("content")?).await
    }
}
