//! Security validation
//!
//! Policy decisions used by collectors while they run: which URLs may be emitted, what raw
//! HTML may look like, and how large an inline `data:` payload may be. Rejections never stop
//! a parse; collectors record them as [`SecurityWarning`]s.

pub mod data_uri;
pub mod html;
pub mod url;

pub use self::data_uri::{check_data_uri, DataUriCheck};
pub use self::html::{sanitize_html, SanitizedHtml};
pub use self::url::{
    validate_image_data_uri, validate_url, LinkKind, UrlRejection, ValidatedUrl,
};

use mdscan_config::ProfileConfig;
use serde::{Deserialize, Serialize};

/// The security knobs of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub allowed_schemes: Vec<String>,
    pub allow_html: bool,
    pub max_data_uri_bytes: usize,
}

impl SecurityPolicy {
    pub fn from_profile(profile: &ProfileConfig) -> Self {
        SecurityPolicy {
            allowed_schemes: profile.allowed_schemes.clone(),
            allow_html: profile.allow_html,
            max_data_uri_bytes: profile.max_data_uri_bytes,
        }
    }

    pub fn validate_url(&self, raw: &str) -> Result<ValidatedUrl, UrlRejection> {
        validate_url(raw, &self.allowed_schemes)
    }

    pub fn check_data_uri(&self, url: &str) -> DataUriCheck {
        check_data_uri(url, self.max_data_uri_bytes)
    }

    pub fn sanitize_html(&self, html: &str) -> SanitizedHtml {
        sanitize_html(html, self)
    }
}

impl Default for SecurityPolicy {
    /// Untrusted-content defaults, matching the `strict` profile.
    fn default() -> Self {
        SecurityPolicy {
            allowed_schemes: vec!["http".into(), "https".into(), "mailto".into()],
            allow_html: false,
            max_data_uri_bytes: 16 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UrlRejected,
    DataUriOverBudget,
    HtmlDropped,
    HtmlSanitized,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::UrlRejected => "url_rejected",
            WarningKind::DataUriOverBudget => "data_uri_over_budget",
            WarningKind::HtmlDropped => "html_dropped",
            WarningKind::HtmlSanitized => "html_sanitized",
        }
    }
}

/// One security-relevant event, kept in the result metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityWarning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl SecurityWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>, line: Option<usize>) -> Self {
        let warning = SecurityWarning {
            kind,
            message: message.into(),
            line,
        };
        log::warn!("{}: {}", kind.as_str(), warning.message);
        warning
    }
}
