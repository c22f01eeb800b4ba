//! Normalisation of untrusted generated content.
//!
//! Every field is handled independently; whatever the candidate looks like,
//! the result satisfies the `OptimizedContent` bounds except for an empty
//! description, which callers treat as a failed generation.

use crate::models::{OptimizedContent, ProductSnapshot};
use crate::validator::{
    SEO_DESCRIPTION_MAX, SEO_DESCRIPTION_MIN, SEO_TITLE_MAX, SEO_TITLE_MIN, TAGS_MAX,
    strip_markup,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

pub const KEYWORD_LIMIT: usize = 6;
pub const FALLBACK_TAG: &str = "Featured";
pub const GENERIC_DEFAULT: &str = "Quality products picked for everyday life";
const CLOSING_FRAGMENT: &str = "Discover more in our store.";
const ELLIPSIS: char = '…';

static BLOCK_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(p|ul|ol|li|h[1-6]|div|section|article|blockquote|table)[\s>/]")
        .expect("block markup regex")
});

pub fn sanitize(candidate: &Value, snapshot: &ProductSnapshot) -> OptimizedContent {
    OptimizedContent {
        description_html: normalize_description(&text_field(candidate.get("descriptionHtml"))),
        tags: normalize_tags(candidate.get("tags"), &snapshot.title),
        seo_title: enforce_length(
            &text_field(candidate.get("seoTitle")),
            &seo_title_fallback(snapshot),
            SEO_TITLE_MIN,
            SEO_TITLE_MAX,
        ),
        seo_description: enforce_length(
            &text_field(candidate.get("seoDescription")),
            &seo_description_fallback(snapshot),
            SEO_DESCRIPTION_MIN,
            SEO_DESCRIPTION_MAX,
        ),
    }
}

/// Scalars are coerced to text; anything else reads as empty.
fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

pub fn normalize_description(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        String::new()
    } else if BLOCK_MARKUP.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("<p>{trimmed}</p>")
    }
}

pub fn normalize_tags(raw: Option<&Value>, title: &str) -> Vec<String> {
    let mut candidates: Vec<String> = match raw {
        Some(Value::Array(items)) => items.iter().map(|item| text_field(Some(item))).collect(),
        Some(Value::String(text)) => split_tags(text),
        _ => Vec::new(),
    }
    .into_iter()
    .map(|tag| tag.trim().to_string())
    .filter(|tag| !tag.is_empty())
    .collect();

    if candidates.is_empty() {
        candidates = title_keywords(title);
    }

    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for tag in candidates {
        if seen.insert(tag.to_lowercase()) {
            tags.push(capitalize(&tag));
        }
    }
    tags.truncate(TAGS_MAX);
    if tags.is_empty() {
        tags.push(FALLBACK_TAG.to_string());
    }
    tags
}

/// Accepts a JSON-encoded array or a comma/newline separated list.
fn split_tags(text: &str) -> Vec<String> {
    if text.trim_start().starts_with('[')
        && let Ok(items) = serde_json::from_str::<Vec<String>>(text)
    {
        return items;
    }
    text.split([',', '\n']).map(|tag| tag.to_string()).collect()
}

pub(crate) fn capitalize(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn title_keywords(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|ch| ch.is_alphanumeric() || *ch == '-')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| word.chars().count() > 2)
        .take(KEYWORD_LIMIT)
        .collect()
}

/// Forces `value` into `[min, max]` characters.
///
/// Padding adds at least the closing fragment per round and any overshoot is
/// cut back to `max - 1` or `max`, both of which are `>= min`, so the loop
/// ends after a few rounds.
pub fn enforce_length(value: &str, fallback: &str, min: usize, max: usize) -> String {
    let mut text = collapse_whitespace(value);
    if text.is_empty() {
        text = collapse_whitespace(fallback);
    }
    if text.is_empty() {
        text = GENERIC_DEFAULT.to_string();
    }

    if char_len(&text) > max {
        text = truncate_with_ellipsis(&text, max);
    }
    while char_len(&text) < min {
        let joiner = if text.ends_with('.') { " " } else { ". " };
        text = format!("{text}{joiner}{CLOSING_FRAGMENT}");
        if char_len(&text) > max {
            text = truncate_with_ellipsis(&text, max);
        }
    }
    text
}

fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    let head: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}{ELLIPSIS}", head.trim_end())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn seo_title_fallback(snapshot: &ProductSnapshot) -> String {
    snapshot
        .seo_title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(&snapshot.title)
        .to_string()
}

fn seo_description_fallback(snapshot: &ProductSnapshot) -> String {
    snapshot
        .seo_description
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            snapshot
                .description_html
                .as_deref()
                .map(strip_markup)
                .unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> ProductSnapshot {
        ProductSnapshot {
            id: "p1".into(),
            title: "Merino Wool Hiking Socks".into(),
            description_html: Some("<p>Warm socks for cold trails.</p>".into()),
            tags: vec![],
            seo_title: None,
            seo_description: None,
        }
    }

    fn assert_bounds(content: &OptimizedContent) {
        let title_len = content.seo_title.chars().count();
        let desc_len = content.seo_description.chars().count();
        assert!((SEO_TITLE_MIN..=SEO_TITLE_MAX).contains(&title_len), "title {title_len}");
        assert!(
            (SEO_DESCRIPTION_MIN..=SEO_DESCRIPTION_MAX).contains(&desc_len),
            "description {desc_len}"
        );
        assert!((1..=TAGS_MAX).contains(&content.tags.len()));
        assert!(BLOCK_MARKUP.is_match(&content.description_html));
    }

    #[test]
    fn tags_dedup_case_insensitively_in_order() {
        let tags = normalize_tags(Some(&json!(["Blue", "blue", " Red "])), "ignored");
        assert_eq!(tags, vec!["Blue", "Red"]);
    }

    #[test]
    fn tags_capitalize_and_cap_at_eight() {
        let raw = json!(["a1", "b2", "c3", "d4", "e5", "f6", "g7", "h8", "i9", "j10"]);
        let tags = normalize_tags(Some(&raw), "");
        assert_eq!(tags.len(), TAGS_MAX);
        assert_eq!(tags[0], "A1");
        assert_eq!(tags[7], "H8");
    }

    #[test]
    fn tags_from_delimited_string() {
        let tags = normalize_tags(Some(&json!("wool, socks\nhiking,,")), "");
        assert_eq!(tags, vec!["Wool", "Socks", "Hiking"]);
    }

    #[test]
    fn tags_from_json_encoded_string() {
        let tags = normalize_tags(Some(&json!(r#"["trail", "gear"]"#)), "");
        assert_eq!(tags, vec!["Trail", "Gear"]);
    }

    #[test]
    fn tags_fall_back_to_title_keywords() {
        let tags = normalize_tags(Some(&json!({"unexpected": true})), "Merino Wool Hiking Socks");
        assert_eq!(tags, vec!["Merino", "Wool", "Hiking", "Socks"]);
        let tags = normalize_tags(None, "A to Z");
        assert_eq!(tags, vec![FALLBACK_TAG]);
    }

    #[test]
    fn keywords_strip_punctuation_and_short_words() {
        let keywords = title_keywords("The All-Weather Jacket (Men's) v2 by Acme, Co. Ltd Extra Words");
        assert_eq!(
            keywords,
            vec!["the", "all-weather", "jacket", "mens", "acme", "ltd"]
        );
    }

    #[test]
    fn description_wrapped_only_without_block_markup() {
        assert_eq!(normalize_description("  plain text "), "<p>plain text</p>");
        assert_eq!(normalize_description("<em>inline</em>"), "<p><em>inline</em></p>");
        assert_eq!(normalize_description("<ul><li>x</li></ul>"), "<ul><li>x</li></ul>");
        assert_eq!(normalize_description("<P class=\"a\">x</P>"), "<P class=\"a\">x</P>");
        assert_eq!(normalize_description("   "), "");
    }

    #[test]
    fn length_at_bounds_is_unchanged() {
        let at_min = "m".repeat(SEO_TITLE_MIN);
        let at_max = "n".repeat(SEO_TITLE_MAX);
        assert_eq!(enforce_length(&at_min, "", SEO_TITLE_MIN, SEO_TITLE_MAX), at_min);
        assert_eq!(enforce_length(&at_max, "", SEO_TITLE_MIN, SEO_TITLE_MAX), at_max);
    }

    #[test]
    fn length_over_max_truncates_with_ellipsis() {
        let over = "n".repeat(SEO_TITLE_MAX + 1);
        let out = enforce_length(&over, "", SEO_TITLE_MIN, SEO_TITLE_MAX);
        assert_eq!(out.chars().count(), SEO_TITLE_MAX);
        assert!(out.ends_with(ELLIPSIS));
    }

    #[test]
    fn empty_uses_fallback_then_default() {
        let fallback = "f".repeat(40);
        assert_eq!(enforce_length("  ", &fallback, SEO_TITLE_MIN, SEO_TITLE_MAX), fallback);
        let out = enforce_length("", "", SEO_TITLE_MIN, SEO_TITLE_MAX);
        assert!(out.starts_with(GENERIC_DEFAULT));
        assert!((SEO_TITLE_MIN..=SEO_TITLE_MAX).contains(&out.chars().count()));
    }

    #[test]
    fn short_text_is_padded_with_closing_fragment() {
        let out = enforce_length("Cozy socks", "", SEO_DESCRIPTION_MIN, SEO_DESCRIPTION_MAX);
        assert!(out.starts_with("Cozy socks. Discover more in our store. Discover"));
        assert!(
            (SEO_DESCRIPTION_MIN..=SEO_DESCRIPTION_MAX).contains(&out.chars().count()),
            "{out}"
        );
        let dotted = enforce_length("Cozy socks.", "", SEO_TITLE_MIN, SEO_TITLE_MAX);
        assert_eq!(dotted, "Cozy socks. Discover more in our store.");
    }

    #[test]
    fn padding_terminates_for_every_short_length() {
        for len in 0..SEO_DESCRIPTION_MIN {
            let input = "z".repeat(len);
            let out = enforce_length(&input, "", SEO_DESCRIPTION_MIN, SEO_DESCRIPTION_MAX);
            let out_len = out.chars().count();
            assert!((SEO_DESCRIPTION_MIN..=SEO_DESCRIPTION_MAX).contains(&out_len));
            let title = enforce_length(&input, "", SEO_TITLE_MIN, SEO_TITLE_MAX);
            assert!((SEO_TITLE_MIN..=SEO_TITLE_MAX).contains(&title.chars().count()));
        }
    }

    #[test]
    fn multibyte_text_measured_in_chars() {
        let text = "é".repeat(SEO_TITLE_MAX);
        assert_eq!(enforce_length(&text, "", SEO_TITLE_MIN, SEO_TITLE_MAX), text);
    }

    #[test]
    fn malformed_candidate_still_meets_bounds() {
        let candidate = json!({
            "descriptionHtml": "Just words",
            "tags": 42,
            "seoTitle": null,
            "seoDescription": ["not", "text"],
        });
        let content = sanitize(&candidate, &snapshot());
        assert_bounds(&content);
        assert_eq!(content.description_html, "<p>Just words</p>");
        assert_eq!(content.tags, vec!["Merino", "Wool", "Hiking", "Socks"]);
        assert!(content.seo_title.starts_with("Merino Wool Hiking Socks"));
        assert!(content.seo_description.starts_with("Warm socks for cold trails."));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let candidate = json!({
            "descriptionHtml": "Thick cushioned merino socks",
            "tags": "socks, Socks, hiking, merino, wool, winter, trail, outdoor, gift, cozy",
            "seoTitle": "Merino Wool Hiking Socks for Cold Trails and Long Days Outdoors",
            "seoDescription": "Warm merino socks",
        });
        let first = sanitize(&candidate, &snapshot());
        assert_bounds(&first);
        let again = sanitize(&serde_json::to_value(&first).unwrap(), &snapshot());
        assert_eq!(first, again);
    }
}
