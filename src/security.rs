use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, convert::Infallible, sync::Arc};
use tracing::{info, warn};

pub const KEY_HEADER: &str = "X-Optimizer-Key";
const DEMO_LABEL: &str = "demo";
const DEMO_KEY: &str = "demo-key";

#[derive(Clone)]
pub struct AuthState {
    records: Arc<HashMap<String, KeyRecord>>,
}

/// Identity attached to every authenticated request.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub label: String,
    pub key_id: String,
}

#[derive(Clone)]
struct KeyRecord {
    label: String,
    key_id: String,
}

impl AuthState {
    /// Parses `label:key,label:key`. No usable entry falls back to `demo:demo-key`.
    pub fn from_key_list(raw: Option<&str>) -> Self {
        Self {
            records: Arc::new(parse_keys(raw.unwrap_or_default())),
        }
    }

    fn authenticate(&self, presented: &str) -> Option<AuthContext> {
        self.records.get(presented).map(|record| AuthContext {
            label: record.label.clone(),
            key_id: record.key_id.clone(),
        })
    }
}

pub async fn require_api_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_api_key(request.headers()) else {
        return Ok(unauthorized_response(
            "missing_api_key",
            "Provide X-Optimizer-Key or Bearer token",
        ));
    };

    let Some(context) = state.authenticate(&presented) else {
        return Ok(unauthorized_response("invalid_api_key", "Key not recognized"));
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn extract_api_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get(KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn unauthorized_response(code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn parse_keys(raw: &str) -> HashMap<String, KeyRecord> {
    let mut entries = HashMap::new();
    for (idx, token) in raw.split(',').enumerate() {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ':');
        let label = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let key = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match (label, key) {
            (Some(label), Some(secret)) => {
                entries.insert(
                    secret.to_string(),
                    KeyRecord {
                        label: label.to_string(),
                        key_id: format!("key-{:02}", idx + 1),
                    },
                );
            }
            // Never log the entry itself; it may hold a secret.
            _ => warn!(
                target = "optimizer.api",
                position = idx + 1,
                "ignored malformed OPTIMIZER_API_KEYS entry"
            ),
        }
    }

    if entries.is_empty() {
        warn!(
            target = "optimizer.api",
            "OPTIMIZER_API_KEYS produced no keys; falling back to demo credentials"
        );
        entries.insert(
            DEMO_KEY.to_string(),
            KeyRecord {
                label: DEMO_LABEL.to_string(),
                key_id: "key-01".to_string(),
            },
        );
    } else {
        info!(
            target = "optimizer.api",
            key_count = entries.len(),
            "loaded API keys"
        );
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_labels_and_skips_malformed_entries() {
        let state = AuthState::from_key_list(Some("ops:k1, broken ,admin:k2,:k3"));
        let ops = state.authenticate("k1").expect("k1");
        assert_eq!(ops.label, "ops");
        assert_eq!(ops.key_id, "key-01");
        assert_eq!(state.authenticate("k2").expect("k2").key_id, "key-03");
        assert!(state.authenticate("k3").is_none());
        assert!(state.authenticate("demo-key").is_none());
    }

    #[test]
    fn empty_key_list_uses_demo_key() {
        let state = AuthState::from_key_list(None);
        assert_eq!(state.authenticate("demo-key").expect("demo").label, "demo");
    }

    #[test]
    fn bearer_takes_precedence_over_header() {
        let mut headers = http::HeaderMap::new();
        headers.insert(KEY_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("from-header"));

        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer  from-bearer "),
        );
        assert_eq!(extract_api_key(&headers).as_deref(), Some("from-bearer"));

        let empty = http::HeaderMap::new();
        assert!(extract_api_key(&empty).is_none());
    }
}
