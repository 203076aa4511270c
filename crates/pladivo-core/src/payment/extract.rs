//! Locate a payment code inside a bank transfer note.
//!
//! Banks pass the customer's note through with extra text around it, so the
//! code is searched for rather than expected verbatim. Two shapes exist:
//!
//! ```text
//! PLADIVO-12/2025/HĐ-SK-1-MIS0HT35   contract numbers with slashes
//! PLADIVO-HD001-1-ABC123             legacy dash-only contract numbers
//! ```

use std::sync::LazyLock;

use regex::Regex;

static SLASH_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PLADIVO-\d+/\d+/\S+").expect("valid regex"));

static DASH_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PLADIVO-HD\d+-\d+-[A-Za-z0-9]+").expect("valid regex"));

/// Extract a payment code from free-form transfer content. The slash format
/// wins over the dash format when both appear.
pub fn extract_payment_code_from_content(content: &str) -> Option<String> {
    [&*SLASH_FORMAT, &*DASH_FORMAT]
        .into_iter()
        .find_map(|re| re.find(content))
        .map(|m| m.as_str().to_string())
}

/// Pick the payment code for a webhook: content first, then the gateway's
/// own `code` field.
pub fn resolve_payment_code(content: &str, code_field: Option<&str>) -> Option<String> {
    extract_payment_code_from_content(content).or_else(|| {
        code_field
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    })
}
