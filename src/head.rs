//! Page-head integration for the Umami tracking script

use crate::config::AnalyticsConfig;

/// `<script>` tag loading the collector's tracker for this website
pub fn script_tag(config: &AnalyticsConfig) -> String {
    format!(
        r#"<script defer src="{}/script.js" data-website-id="{}"></script>"#,
        escape_attr(&config.base_url),
        escape_attr(&config.website_id)
    )
}

/// The configured head-end markup with the tracking script appended.
pub fn head_end(config: &AnalyticsConfig) -> String {
    append_to(config.head_end.as_deref(), &script_tag(config))
}

/// Append `snippet` to an existing head-end value.
pub fn append_to(head_end: Option<&str>, snippet: &str) -> String {
    let mut out = head_end.unwrap_or_default().to_string();
    out.push_str(snippet);
    out
}

/// Insert `snippet` right before `</head>`. Returns `None` when the document
/// has no head or already carries the snippet.
pub fn inject_into_html(html: &str, snippet: &str) -> Option<String> {
    if html.contains(snippet) {
        return None;
    }

    let idx = find_ascii_case_insensitive(html, "</head>")?;
    let mut out = String::with_capacity(html.len() + snippet.len());
    out.push_str(&html[..idx]);
    out.push_str(snippet);
    out.push_str(&html[idx..]);
    Some(out)
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
