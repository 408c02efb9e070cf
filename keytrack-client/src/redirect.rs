//! Navigation target derived from a finished batch
//!
//! All keywords from all slots (slot order, then keyword order) are
//! trimmed, lower-cased, stripped of empties, comma-joined and
//! percent-encoded into the music search path.

use keytrack_common::PerFileResult;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use tracing::info;

/// Search page path; the encoded keyword list is appended
pub const REDIRECT_PATH_PREFIX: &str = "/music/?srp_page=1&srp_player_id=hpmplayer&srp_search=";

/// Characters left unescaped in a URI component: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Build the redirect path for a batch
///
/// Returns `None` for an empty batch.
pub fn build_redirect(results: &[PerFileResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let keywords = normalize_keywords(
        results
            .iter()
            .flat_map(|result| result.analysis.iter().map(String::as_str)),
    );

    Some(redirect_for(&keywords))
}

/// Build the redirect path from an untyped JSON payload
///
/// Returns `None` unless `value` is a non-empty array. Entries without a
/// usable `analysis` array contribute no keywords.
pub fn build_redirect_value(value: &Value) -> Option<String> {
    let entries = value.as_array()?;
    if entries.is_empty() {
        return None;
    }

    let keywords = normalize_keywords(
        entries
            .iter()
            .filter_map(|entry| entry.get("analysis").and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_str),
    );

    Some(redirect_for(&keywords))
}

/// Trim, lower-case and drop empty keywords
pub fn normalize_keywords<'a, I>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    keywords
        .into_iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

fn redirect_for(keywords: &[String]) -> String {
    let joined = keywords.join(",");
    format!(
        "{}{}",
        REDIRECT_PATH_PREFIX,
        utf8_percent_encode(&joined, URI_COMPONENT)
    )
}

/// Consumer of the redirect target
///
/// The client never navigates by itself; whatever embeds it decides what
/// "navigating" means (open a browser, print a link, record it in a test).
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Navigator that logs the target joined to an optional site base URL
#[derive(Debug, Clone, Default)]
pub struct LogNavigator {
    site_base_url: Option<String>,
}

impl LogNavigator {
    pub fn new(site_base_url: Option<String>) -> Self {
        Self { site_base_url }
    }

    /// Absolute URL when a site base is configured, else the bare path
    pub fn resolve(&self, target: &str) -> String {
        match &self.site_base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), target),
            None => target.to_string(),
        }
    }
}

impl Navigator for LogNavigator {
    fn navigate(&self, target: &str) {
        let url = self.resolve(target);
        info!(url = %url, "Analysis complete, navigating to results");
        println!("{}", url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn done(filename: &str, analysis: &[&str]) -> PerFileResult {
        let mut slot = PerFileResult::pending(filename);
        slot.analysis = analysis.iter().map(|s| s.to_string()).collect();
        slot.status = keytrack_common::SlotStatus::Done;
        slot
    }

    #[test]
    fn test_build_redirect_normalizes_and_encodes() {
        let batch = vec![done("a.mp4", &["Rock", "pop "]), done("b.mp4", &["rock", ""])];

        assert_eq!(
            build_redirect(&batch).unwrap(),
            "/music/?srp_page=1&srp_player_id=hpmplayer&srp_search=rock%2Cpop%2Crock"
        );
    }

    #[test]
    fn test_build_redirect_empty_batch() {
        assert!(build_redirect(&[]).is_none());
    }

    #[test]
    fn test_build_redirect_follows_slot_order() {
        let batch = vec![done("a.mp4", &["funk"]), done("b.mp4", &["jazz"])];
        assert!(build_redirect(&batch).unwrap().ends_with("srp_search=funk%2Cjazz"));
    }

    #[test]
    fn test_build_redirect_without_keywords() {
        let batch = vec![PerFileResult::pending("a.mp4")];
        assert_eq!(build_redirect(&batch).unwrap(), REDIRECT_PATH_PREFIX);
    }

    #[test]
    fn test_build_redirect_encodes_reserved_characters() {
        let batch = vec![done("a.mp4", &["Hip Hop", "R&B"])];
        assert!(build_redirect(&batch)
            .unwrap()
            .ends_with("srp_search=hip%20hop%2Cr%26b"));
    }

    #[test]
    fn test_build_redirect_keeps_uri_component_marks() {
        let batch = vec![
            done("a.mp4", &["Rock'n'Roll (Live)!", "A*"]),
            done("b.mp4", &["café~"]),
        ];
        assert!(build_redirect(&batch)
            .unwrap()
            .ends_with("srp_search=rock'n'roll%20(live)!%2Ca*%2Ccaf%C3%A9~"));
    }

    #[test]
    fn test_build_redirect_value_rejects_non_sequence() {
        assert!(build_redirect_value(&json!({"analysis": ["rock"]})).is_none());
        assert!(build_redirect_value(&json!("rock")).is_none());
        assert!(build_redirect_value(&Value::Null).is_none());
        assert!(build_redirect_value(&json!([])).is_none());
    }

    #[test]
    fn test_build_redirect_value_matches_typed() {
        let value = json!([
            {"filename": "a.mp4", "analysis": ["Rock", "pop "]},
            {"filename": "b.mp4", "analysis": ["rock", ""]},
            {"filename": "c.mp4"}
        ]);
        assert!(build_redirect_value(&value)
            .unwrap()
            .ends_with("srp_search=rock%2Cpop%2Crock"));
    }

    #[test]
    fn test_log_navigator_resolve() {
        let nav = LogNavigator::new(Some("https://www.example.com/".to_string()));
        assert_eq!(
            nav.resolve("/music/?srp_page=1"),
            "https://www.example.com/music/?srp_page=1"
        );
        assert_eq!(LogNavigator::default().resolve("/music/"), "/music/");
    }
}
