use crate::models::{FieldHealth, HealthStatus, ProductHealth, ProductSnapshot};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DESCRIPTION_MIN_WORDS: usize = 60;
pub const TAGS_MIN: usize = 3;
pub const TAGS_MAX: usize = 8;
pub const SEO_TITLE_MIN: usize = 35;
pub const SEO_TITLE_MAX: usize = 60;
pub const SEO_DESCRIPTION_MIN: usize = 110;
pub const SEO_DESCRIPTION_MAX: usize = 160;

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("markup regex"));

/// Removes tags, decodes entities and collapses whitespace.
pub fn strip_markup(html: &str) -> String {
    let without_tags = MARKUP.replace_all(html, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn word_count(html: &str) -> usize {
    strip_markup(html).split_whitespace().count()
}

pub fn description_health(description_html: Option<&str>) -> FieldHealth {
    let words = description_html.map(word_count).unwrap_or(0);
    if words == 0 {
        FieldHealth::new(HealthStatus::Missing, "Description is missing")
    } else if words < DESCRIPTION_MIN_WORDS {
        FieldHealth::new(
            HealthStatus::Weak,
            format!("Description has {words} words (aim for {DESCRIPTION_MIN_WORDS}+)"),
        )
    } else {
        FieldHealth::new(HealthStatus::Ok, format!("Description has {words} words"))
    }
}

pub fn tags_health(tags: &[String]) -> FieldHealth {
    let count = tags.len();
    if count == 0 {
        FieldHealth::new(HealthStatus::Missing, "No tags")
    } else if count < TAGS_MIN {
        FieldHealth::new(
            HealthStatus::Weak,
            format!("{count} tags (aim for {TAGS_MIN}+)"),
        )
    } else {
        FieldHealth::new(HealthStatus::Ok, format!("{count} tags"))
    }
}

pub fn seo_title_health(seo_title: Option<&str>) -> FieldHealth {
    length_health("SEO title", seo_title, SEO_TITLE_MIN, SEO_TITLE_MAX)
}

pub fn seo_description_health(seo_description: Option<&str>) -> FieldHealth {
    length_health(
        "SEO description",
        seo_description,
        SEO_DESCRIPTION_MIN,
        SEO_DESCRIPTION_MAX,
    )
}

fn length_health(label: &str, value: Option<&str>, min: usize, max: usize) -> FieldHealth {
    let len = value.map(|v| v.trim().chars().count()).unwrap_or(0);
    if len == 0 {
        FieldHealth::new(HealthStatus::Missing, format!("{label} is missing"))
    } else if !(min..=max).contains(&len) {
        FieldHealth::new(
            HealthStatus::Weak,
            format!("{label} is {len} characters (aim for {min}-{max})"),
        )
    } else {
        FieldHealth::new(HealthStatus::Ok, format!("{label} is {len} characters"))
    }
}

pub fn product_health(snapshot: &ProductSnapshot) -> ProductHealth {
    ProductHealth {
        description: description_health(snapshot.description_html.as_deref()),
        tags: tags_health(&snapshot.tags),
        seo_title: seo_title_health(snapshot.seo_title.as_deref()),
        seo_description: seo_description_health(snapshot.seo_description.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        format!("<p>{}</p>", vec!["word"; n].join(" "))
    }

    #[test]
    fn strip_markup_decodes_and_collapses() {
        let html = "<p>Soft &amp; warm</p>\n<ul><li>Wool</li></ul>";
        assert_eq!(strip_markup(html), "Soft & warm Wool");
    }

    #[test]
    fn description_word_boundaries() {
        assert_eq!(description_health(Some(&words(60))).status, HealthStatus::Ok);
        assert_eq!(description_health(Some(&words(59))).status, HealthStatus::Weak);
        assert_eq!(description_health(Some("<p> </p>")).status, HealthStatus::Missing);
        assert_eq!(description_health(None).status, HealthStatus::Missing);
        assert!(description_health(Some(&words(59))).message.contains("59"));
    }

    #[test]
    fn tag_count_boundaries() {
        let tags = |n: usize| (0..n).map(|i| format!("tag{i}")).collect::<Vec<_>>();
        assert_eq!(tags_health(&tags(0)).status, HealthStatus::Missing);
        assert_eq!(tags_health(&tags(2)).status, HealthStatus::Weak);
        assert_eq!(tags_health(&tags(3)).status, HealthStatus::Ok);
    }

    #[test]
    fn seo_title_length_boundaries() {
        for (len, status) in [
            (34, HealthStatus::Weak),
            (35, HealthStatus::Ok),
            (60, HealthStatus::Ok),
            (61, HealthStatus::Weak),
        ] {
            let title = "x".repeat(len);
            assert_eq!(seo_title_health(Some(&title)).status, status, "len {len}");
        }
        assert_eq!(seo_title_health(Some("")).status, HealthStatus::Missing);
        assert_eq!(seo_title_health(None).status, HealthStatus::Missing);
    }

    #[test]
    fn seo_description_length_boundaries() {
        for (len, status) in [
            (109, HealthStatus::Weak),
            (110, HealthStatus::Ok),
            (160, HealthStatus::Ok),
            (161, HealthStatus::Weak),
        ] {
            let text = "y".repeat(len);
            assert_eq!(seo_description_health(Some(&text)).status, status, "len {len}");
        }
        assert_eq!(seo_description_health(None).status, HealthStatus::Missing);
    }

    #[test]
    fn product_needs_optimization_unless_all_ok() {
        let mut snapshot = ProductSnapshot {
            id: "1".into(),
            title: "Lamp".into(),
            description_html: Some(words(80)),
            tags: vec!["a".into(), "b".into(), "c".into()],
            seo_title: Some("t".repeat(40)),
            seo_description: Some("d".repeat(120)),
        };
        assert!(!product_health(&snapshot).needs_optimization());
        snapshot.seo_description = None;
        assert!(product_health(&snapshot).needs_optimization());
    }
}
