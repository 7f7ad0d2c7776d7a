//! Control-surface handlers: provider health, pause/resume, and the
//! async-ack admin trigger.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::AppState;

pub async fn provider_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.control.snapshot())
}

#[derive(Deserialize)]
pub struct HealthAction {
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
    /// Provider class for the probe action.
    #[serde(default)]
    pub provider: Option<String>,
}

pub async fn provider_health_action(
    State(state): State<Arc<AppState>>,
    Json(body): Json<HealthAction>,
) -> impl IntoResponse {
    match body.action.as_str() {
        "pause" => {
            let reason = body.reason.as_deref().unwrap_or("manual pause");
            state.control.pause(reason);
            Json(state.control.snapshot()).into_response()
        }
        "resume" => {
            state.control.resume().await;
            Json(state.control.snapshot()).into_response()
        }
        "probe" => {
            let class = match body.provider.as_deref() {
                Some("search") => verity_runner::ProviderClass::Search,
                Some("llm") => verity_runner::ProviderClass::Llm,
                other => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": format!("probe requires provider 'search' or 'llm', got {other:?}") })),
                    )
                        .into_response();
                }
            };
            state.control.probe(class);
            Json(state.control.snapshot()).into_response()
        }
        other => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown action '{other}'") })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJobRequest {
    pub job_id: uuid::Uuid,
}

/// Enqueue a job and ack immediately — the analysis itself runs behind the
/// queue, never on the request path.
pub async fn run_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RunJobRequest>,
) -> impl IntoResponse {
    // A missing trigger secret is a deployment fault: refuse to run
    // insecurely rather than skipping the check.
    if state.config.control_api_token.is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "CONTROL_API_TOKEN not configured" })),
        )
            .into_response();
    }
    if !check_bearer(&headers, &state.config.control_api_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid or missing bearer token" })),
        )
            .into_response();
    }

    let accepted = state.queue.submit(body.job_id);
    info!(job_id = %body.job_id, accepted, "Run-job trigger");
    Arc::clone(&state.queue).spawn_drain();

    (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response()
}

fn check_bearer(headers: &HeaderMap, expected: &str) -> bool {
    let Some(auth) = headers.get(header::AUTHORIZATION) else {
        return false;
    };
    let Ok(auth_str) = auth.to_str() else {
        return false;
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return false;
    };
    constant_time_eq(token.as_bytes(), expected.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"Token"));
        assert!(!constant_time_eq(b"token", b"token2"));
        assert!(!constant_time_eq(b"", b"x"));
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(!check_bearer(&headers, "secret"));

        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(check_bearer(&headers, "secret"));

        headers.insert(header::AUTHORIZATION, "Basic secret".parse().unwrap());
        assert!(!check_bearer(&headers, "secret"));
    }
}
