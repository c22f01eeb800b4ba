use crate::llm::{LlmClient, LlmError, LlmMessage};
use crate::models::{ContentSource, OptimizedContent, ProductSnapshot};
use crate::sanitize::{capitalize, enforce_length, sanitize, title_keywords};
use crate::validator::{
    DESCRIPTION_MIN_WORDS, SEO_DESCRIPTION_MAX, SEO_DESCRIPTION_MIN, SEO_TITLE_MAX,
    SEO_TITLE_MIN, TAGS_MAX, TAGS_MIN, strip_markup,
};
use html_escape::encode_text;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = r#"
You are an e-commerce copywriter and SEO specialist. You rewrite product listings so they rank well
and convert, using only the facts you are given. Output JSON only, with no commentary.
"#;

const REQUIRED_KEYS: [&str; 4] = ["descriptionHtml", "tags", "seoTitle", "seoDescription"];
const PLACEHOLDER: &str = "(none)";
const SUPPORT_CLOSING: &str =
    "Enjoy fast shipping, secure checkout and friendly support with every order.";
const SEO_CLOSING: &str = "Fast shipping, secure checkout and friendly support.";
const BULLET_LIMIT: usize = 4;
const SEO_TITLE_KEYWORDS: usize = 3;

#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("no model credential configured")]
    ConfigurationMissing,
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GenerationFailure {
    pub fn code(&self) -> &'static str {
        match self {
            GenerationFailure::ConfigurationMissing => "configuration_missing",
            GenerationFailure::Transport(_) => "upstream_transport_error",
            GenerationFailure::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<LlmError> for GenerationFailure {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingApiKey => GenerationFailure::ConfigurationMissing,
            LlmError::Timeout => GenerationFailure::Transport("request timed out".into()),
            LlmError::Http(message) | LlmError::Provider(message) => {
                GenerationFailure::Transport(message)
            }
            LlmError::InvalidResponse(message) => GenerationFailure::MalformedResponse(message),
        }
    }
}

#[derive(Debug)]
pub enum GenerationOutcome {
    Success(OptimizedContent),
    Failure(GenerationFailure),
}

#[derive(Debug, Clone)]
pub struct Generated {
    pub content: OptimizedContent,
    pub source: ContentSource,
}

pub struct ContentGenerator {
    llm: LlmClient,
}

impl ContentGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Always resolves: a failed model attempt is logged and replaced by
    /// deterministic content.
    pub async fn generate(&self, snapshot: &ProductSnapshot) -> Generated {
        let generated = match self.attempt_model(snapshot).await {
            GenerationOutcome::Success(content) => Generated {
                content,
                source: ContentSource::Model,
            },
            GenerationOutcome::Failure(reason) => {
                warn!(
                    target = "optimizer.llm",
                    product_id = %snapshot.id,
                    failure = reason.code(),
                    error = %reason,
                    "llm_generation_fallback"
                );
                Generated {
                    content: fallback(snapshot),
                    source: ContentSource::Fallback,
                }
            }
        };
        crate::metrics::generation_source(generated.source);
        generated
    }

    pub async fn attempt_model(&self, snapshot: &ProductSnapshot) -> GenerationOutcome {
        if !self.llm.has_credential() {
            return GenerationOutcome::Failure(GenerationFailure::ConfigurationMissing);
        }

        let messages = [
            LlmMessage::system(SYSTEM_PROMPT.trim()),
            LlmMessage::user(build_prompt(snapshot)),
        ];
        let response = match self.llm.chat(&messages).await {
            Ok(response) => response,
            Err(err) => return GenerationOutcome::Failure(err.into()),
        };
        if let Some(usage) = &response.usage {
            debug!(
                target = "optimizer.llm",
                product_id = %snapshot.id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "llm_usage"
            );
        }

        let candidate = match parse_candidate(&response.text) {
            Ok(candidate) => candidate,
            Err(failure) => return GenerationOutcome::Failure(failure),
        };
        let content = sanitize(&candidate, snapshot);
        if content.description_html.is_empty() {
            return GenerationOutcome::Failure(GenerationFailure::MalformedResponse(
                "empty descriptionHtml".into(),
            ));
        }
        GenerationOutcome::Success(content)
    }
}

pub fn build_prompt(snapshot: &ProductSnapshot) -> String {
    let description = snapshot
        .description_html
        .as_deref()
        .map(strip_markup)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| PLACEHOLDER.to_string());
    let tags = if snapshot.tags.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        snapshot.tags.join(", ")
    };
    let seo_title = non_empty(snapshot.seo_title.as_deref()).unwrap_or(PLACEHOLDER);
    let seo_description = non_empty(snapshot.seo_description.as_deref()).unwrap_or(PLACEHOLDER);

    format!(
        r#"Improve this product listing for search visibility and conversion.

Product title: {title}
Current description: {description}
Current tags: {tags}
Current SEO title: {seo_title}
Current SEO description: {seo_description}

Respond with a JSON object containing exactly these keys:
- "descriptionHtml": an HTML description of at least {DESCRIPTION_MIN_WORDS} words built from <p> and <ul><li> elements
- "tags": an array of {TAGS_MIN} to {TAGS_MAX} short search phrases
- "seoTitle": between {SEO_TITLE_MIN} and {SEO_TITLE_MAX} characters
- "seoDescription": between {SEO_DESCRIPTION_MIN} and {SEO_DESCRIPTION_MAX} characters

Do not invent product features, materials, dimensions or certifications that are not stated above."#,
        title = snapshot.title.trim(),
    )
}

/// Parses model output into a candidate object. Anything other than an
/// object carrying all four keys counts as malformed.
fn parse_candidate(text: &str) -> Result<Value, GenerationFailure> {
    let cleaned = strip_markdown_fence(text);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|err| GenerationFailure::MalformedResponse(err.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(GenerationFailure::MalformedResponse(
            "expected a JSON object".into(),
        ));
    };
    if let Some(missing) = REQUIRED_KEYS
        .iter()
        .find(|key| object.get(**key).is_none_or(Value::is_null))
    {
        return Err(GenerationFailure::MalformedResponse(format!(
            "missing key `{missing}`"
        )));
    }
    Ok(value)
}

/// Unwraps a ```-fenced reply. The closing fence may share a line with the
/// body, and the whole reply may sit on one line.
fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = match rest.split_once('\n') {
        Some((info, tail)) if is_info_string(info) => tail,
        _ => rest.trim_start_matches(|ch: char| ch.is_ascii_alphanumeric()),
    };
    let body = body.split("```").next().unwrap_or(body);
    body.trim().to_string()
}

fn is_info_string(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// Deterministic content built from the snapshot alone.
pub fn fallback(snapshot: &ProductSnapshot) -> OptimizedContent {
    let title = snapshot.title.trim();
    let keywords = title_keywords(title);
    let existing = snapshot
        .description_html
        .as_deref()
        .map(strip_markup)
        .filter(|text| !text.is_empty());

    let lead = existing.clone().unwrap_or_else(|| {
        format!("Discover {title}, made to bring dependable quality and real value to your everyday routine.")
    });
    let mut description = format!("<p>{}</p>", encode_text(&lead));
    if !keywords.is_empty() {
        description.push_str("<ul>");
        for keyword in keywords.iter().take(BULLET_LIMIT) {
            description.push_str(&format!("<li>{}</li>", encode_text(&capitalize(keyword))));
        }
        description.push_str("</ul>");
    }
    description.push_str(&format!("<p>{SUPPORT_CLOSING}</p>"));

    let tags = if snapshot.tags.is_empty() {
        keywords.clone()
    } else {
        snapshot.tags.clone()
    };

    let seo_title = if keywords.is_empty() {
        format!("{title} | Shop Now")
    } else {
        let highlights: Vec<&str> = keywords
            .iter()
            .take(SEO_TITLE_KEYWORDS)
            .map(String::as_str)
            .collect();
        format!("{title} | {}", highlights.join(" · "))
    };

    let seo_lead = existing.unwrap_or_else(|| format!("Shop {title} with confidence."));
    let seo_description = format!("{seo_lead} {SEO_CLOSING}");

    let candidate = json!({
        "descriptionHtml": description,
        "tags": tags,
        "seoTitle": enforce_length(&seo_title, title, SEO_TITLE_MIN, SEO_TITLE_MAX),
        "seoDescription": enforce_length(
            &seo_description,
            title,
            SEO_DESCRIPTION_MIN,
            SEO_DESCRIPTION_MAX,
        ),
    });
    sanitize(&candidate, snapshot)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}
