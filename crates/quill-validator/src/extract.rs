//! Reply body extraction
//!
//! Models frequently wrap structured replies in a Markdown code fence. A
//! reply that already parses as JSON is taken whole, so fences quoted
//! inside its strings are left alone.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::IgnoredAny;

static FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").ok());

/// The trimmed reply when it is JSON, else the body of the first fenced
/// block, else the trimmed reply
#[must_use]
pub fn extract_structured_body(raw: &str) -> &str {
    let trimmed = raw.trim();
    if serde_json::from_str::<IgnoredAny>(trimmed).is_ok() {
        return trimmed;
    }
    FENCE
        .as_ref()
        .and_then(|fence| fence.captures(raw))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| raw.trim(), |m| m.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(extract_structured_body(raw), "{\"a\": 1}");
    }

    #[test]
    fn extracts_untagged_fence() {
        assert_eq!(extract_structured_body("```\n[1,2]\n```"), "[1,2]");
    }

    #[test]
    fn plain_reply_is_trimmed() {
        assert_eq!(extract_structured_body("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn unfenced_json_quoting_a_fence_is_kept_whole() {
        let raw = "{\"content\": \"She wrote:\\n```\\nlet x = 1;\\n```\\nand left.\"}\n";
        assert_eq!(extract_structured_body(raw), raw.trim());
    }
}
