//! HAR 1.2 page-load records

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Har {
    pub log: HarLog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarLog {
    pub version: String,
    pub creator: HarCreator,
    #[serde(default)]
    pub pages: Vec<HarPage>,
    #[serde(default)]
    pub entries: Vec<HarEntry>,
}

impl Default for HarLog {
    fn default() -> Self {
        Self {
            version: "1.2".to_string(),
            creator: HarCreator::default(),
            pages: Vec::new(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCreator {
    pub name: String,
    pub version: String,
}

impl Default for HarCreator {
    fn default() -> Self {
        Self {
            name: "hubcheck".to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarPage {
    pub id: String,
    #[serde(rename = "startedDateTime")]
    pub started_date_time: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pageref: Option<String>,
    #[serde(rename = "startedDateTime", default)]
    pub started_date_time: String,
    #[serde(default)]
    pub time: f64,
    pub request: HarRequest,
    pub response: HarResponse,
}

impl HarEntry {
    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn status(&self) -> i64 {
        self.response.status
    }

    fn is_document(&self) -> bool {
        self.response.content.mime_type.starts_with("text/html")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarRequest {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarResponse {
    pub status: i64,
    #[serde(rename = "statusText", default)]
    pub status_text: String,
    #[serde(default)]
    pub content: HarContent,
    #[serde(rename = "redirectURL", default)]
    pub redirect_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarContent {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

/// True when a page-load entry shows the load failed
pub fn error_loading_page(entry: &HarEntry) -> bool {
    let status = entry.status();
    status == 0 || status >= 400
}

fn same_url(a: &str, b: &str) -> bool {
    fn norm(u: &str) -> &str {
        let u = u.split('#').next().unwrap_or(u);
        u.trim_end_matches('/')
    }
    norm(a) == norm(b)
}

/// Entry describing the load of `url`, or of the first document when `url`
/// is None
///
/// For a url, the latest matching entry wins since later requests follow
/// redirects and retries.
pub fn select_entry<'a>(entries: &'a [HarEntry], url: Option<&str>) -> Option<&'a HarEntry> {
    match url {
        Some(url) => entries.iter().rev().find(|e| same_url(e.url(), url)),
        None => entries
            .iter()
            .find(|e| e.is_document() || (300..400).contains(&e.status()) || error_loading_page(e))
            .or_else(|| entries.first()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    pub(crate) fn entry(url: &str, status: i64, mime: &str) -> HarEntry {
        HarEntry {
            pageref: None,
            started_date_time: "2024-01-01T00:00:00.000Z".to_string(),
            time: 0.0,
            request: HarRequest {
                method: "GET".to_string(),
                url: url.to_string(),
            },
            response: HarResponse {
                status,
                status_text: String::new(),
                content: HarContent {
                    mime_type: mime.to_string(),
                },
                redirect_url: String::new(),
            },
        }
    }

    #[test_case(200, false)]
    #[test_case(302, false)]
    #[test_case(0, true)]
    #[test_case(404, true)]
    #[test_case(500, true)]
    fn test_error_loading_page(status: i64, failed: bool) {
        assert_eq!(error_loading_page(&entry("https://hub/", status, "text/html")), failed);
    }

    #[test]
    fn test_select_first_document() {
        let entries = vec![
            entry("https://hub/tags/foo", 404, "text/html; charset=utf-8"),
            entry("https://hub/media/logo.png", 200, "image/png"),
        ];
        assert_eq!(select_entry(&entries, None).map(HarEntry::status), Some(404));
    }

    #[test]
    fn test_select_skips_leading_assets() {
        let entries = vec![
            entry("https://hub/favicon.ico", 200, "image/x-icon"),
            entry("https://hub/tags", 200, "text/html"),
        ];
        assert_eq!(select_entry(&entries, None).map(HarEntry::url), Some("https://hub/tags"));
    }

    #[test]
    fn test_select_by_url_takes_latest() {
        let entries = vec![
            entry("https://hub/tools/foo/", 500, "text/html"),
            entry("https://hub/tools/foo#top", 200, "text/html"),
        ];
        assert_eq!(select_entry(&entries, Some("https://hub/tools/foo")).map(HarEntry::status), Some(200));
        assert!(select_entry(&entries, Some("https://hub/tools/bar")).is_none());
        assert!(select_entry(&[], None).is_none());
    }

    #[test]
    fn test_parse_playwright_har() {
        let raw = r#"{"log":{"version":"1.2","creator":{"name":"Playwright","version":"1.40"},
            "entries":[{"startedDateTime":"2024-01-01T00:00:00Z","time":12.5,
            "request":{"method":"GET","url":"https://hub/"},
            "response":{"status":200,"statusText":"OK","content":{"mimeType":"text/html","size":10},"redirectURL":""}}]}}"#;
        let har: Har = serde_json::from_str(raw).unwrap();
        assert_eq!(har.log.entries.len(), 1);
        assert!(!error_loading_page(&har.log.entries[0]));
    }
}
