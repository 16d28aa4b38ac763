//! Meeting presence endpoint.
//!
//! - GET /state              - presence as JSON
//! - GET /state?style=waybar - waybar custom module output

use crate::api::error::{ApiError, ApiResult};
use crate::publisher::{PresenceStatus, PresenceStatusHandle};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;

pub fn router(status: PresenceStatusHandle) -> Router {
    Router::new()
        .route("/state", get(meeting_state))
        .with_state(status)
}

async fn meeting_state(
    Query(params): Query<HashMap<String, String>>,
    State(status): State<PresenceStatusHandle>,
) -> ApiResult<Json<Value>> {
    let state = status.get().await;

    match params.get("style").map(String::as_str) {
        None | Some("json") => Ok(Json(plain(&state))),
        Some("waybar") => Ok(Json(waybar(&state))),
        Some(other) => Err(ApiError::bad_request(format!(
            "Unknown style '{}', expected 'json' or 'waybar'",
            other
        ))),
    }
}

fn plain(state: &PresenceStatus) -> Value {
    json!({
        "active": state.active.unwrap_or(false),
        "known": state.active.is_some(),
        "reason": state.reason.map(|r| r.as_str()),
        "updated_at": state.updated_at,
        "seconds_since_update": state.seconds_since_update(),
        "published": state.published,
        "pending": state.is_pending(),
        "sink": state.sink,
        "sink_connected": state.sink_connected,
        "browser_connected": state.browser_connected,
        "last_error": state.last_error,
    })
}

fn waybar(state: &PresenceStatus) -> Value {
    let (text, class, tooltip) = match state.active {
        Some(true) => {
            let minutes = state.seconds_since_update().unwrap_or(0) / 60;
            (
                "\u{f0d6b}".to_string(), // Nerd Font phone icon
                "meetstate-active".to_string(),
                format!("In a meeting for {} min", minutes),
            )
        }
        Some(false) => (
            String::new(),
            "meetstate-idle".to_string(),
            "No meeting".to_string(),
        ),
        None => (
            String::new(),
            "meetstate-unknown".to_string(),
            "Waiting for the browser".to_string(),
        ),
    };

    json!({
        "text": text,
        "class": class,
        "tooltip": tooltip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::PublishReason;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn get_json(status: PresenceStatusHandle, uri: &str) -> (StatusCode, Value) {
        let response = router(status)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let code = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (code, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_state_before_any_event() {
        let (code, body) = get_json(PresenceStatusHandle::default(), "/state").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["active"], false);
        assert_eq!(body["known"], false);
        assert_eq!(body["pending"], false);
    }

    #[tokio::test]
    async fn test_state_after_publish() {
        let status = PresenceStatusHandle::default();
        status.set_sink("log").await;
        status.observe(true, PublishReason::Browser).await;
        status.published(true).await;

        let (code, body) = get_json(status, "/state?style=json").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["active"], true);
        assert_eq!(body["known"], true);
        assert_eq!(body["reason"], "browser");
        assert_eq!(body["published"], true);
        assert_eq!(body["sink"], "log");
        assert_eq!(body["pending"], false);
    }

    #[tokio::test]
    async fn test_state_waybar_style() {
        let status = PresenceStatusHandle::default();
        let (_, body) = get_json(status.clone(), "/state?style=waybar").await;
        assert_eq!(body["class"], "meetstate-unknown");

        status.observe(true, PublishReason::Browser).await;
        let (_, body) = get_json(status.clone(), "/state?style=waybar").await;
        assert_eq!(body["class"], "meetstate-active");
        assert_eq!(body["tooltip"], "In a meeting for 0 min");

        status.observe(false, PublishReason::NoBrowsers).await;
        let (_, body) = get_json(status, "/state?style=waybar").await;
        assert_eq!(body["class"], "meetstate-idle");
        assert_eq!(body["text"], "");
    }

    #[tokio::test]
    async fn test_state_unknown_style() {
        let (code, body) = get_json(PresenceStatusHandle::default(), "/state?style=xml").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], true);
        assert!(body["message"].as_str().unwrap().contains("xml"));
    }
}
