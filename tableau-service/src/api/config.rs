//! Configuration endpoints.
//!
//! `POST /config` takes query parameters and/or a JSON object body. Both are
//! merged into one patch (body keys win) and applied through the store.

use axum::{
    Json,
    extract::{Query, State},
};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::AppState;
use crate::config::Patch;
use crate::error::{ServiceError, ServiceResult};

/// GET /config - full configuration document
pub async fn get_config_handler(State(state): State<Arc<AppState>>) -> Json<Map<String, Value>> {
    Json(state.store.get())
}

/// POST /config - merge a patch, persist it, reload affected handles
pub async fn update_config_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> ServiceResult<Json<Map<String, Value>>> {
    let patch = build_patch(query, &body, state.store.snapshot().document())?;
    let committed = state.store.update(Patch::Document(patch))?;
    Ok(Json(committed.document().clone()))
}

/// Merge query parameters and the JSON body into one patch.
///
/// A query value stays a string when the key currently holds a string.
/// Otherwise it is read as JSON, falling back to a string.
fn build_patch(
    query: HashMap<String, String>,
    body: &[u8],
    current: &Map<String, Value>,
) -> ServiceResult<Map<String, Value>> {
    let mut patch: Map<String, Value> = query
        .into_iter()
        .map(|(key, raw)| {
            let value = match current.get(&key) {
                Some(Value::String(_)) => Value::String(raw),
                _ => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            };
            (key, value)
        })
        .collect();

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(patch);
    }

    match serde_json::from_slice(body) {
        Ok(Value::Object(fields)) => patch.extend(fields),
        Ok(_) => {
            return Err(ServiceError::InvalidRequest {
                message: "configuration body must be a JSON object".to_string(),
            });
        }
        Err(e) => {
            return Err(ServiceError::InvalidRequest {
                message: format!("configuration body is not valid JSON: {}", e),
            });
        }
    }

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_router;
    use crate::gateway::testing::StubBackends;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::json;
    use tower::ServiceExt;

    fn defaults() -> Map<String, Value> {
        json!({ "music_model": "facebook/musicgen-small", "whisper_model": "base", "BGM_duration": 8 })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_query_values_are_typed_and_body_wins() {
        let query = HashMap::from([
            ("BGM_duration".to_string(), "12".to_string()),
            ("music_model".to_string(), "facebook/musicgen-large".to_string()),
            ("whisper_model".to_string(), "tiny".to_string()),
        ]);
        let patch = build_patch(query, br#"{"whisper_model": "medium"}"#, &defaults()).unwrap();

        assert_eq!(patch["BGM_duration"], json!(12));
        assert_eq!(patch["music_model"], json!("facebook/musicgen-large"));
        assert_eq!(patch["whisper_model"], json!("medium"));
    }

    #[test]
    fn test_query_values_for_string_keys_stay_strings() {
        let query = HashMap::from([
            ("music_model".to_string(), "2".to_string()),
            ("whisper_model".to_string(), "true".to_string()),
            ("theme".to_string(), "3".to_string()),
        ]);
        let patch = build_patch(query, b"", &defaults()).unwrap();

        assert_eq!(patch["music_model"], json!("2"));
        assert_eq!(patch["whisper_model"], json!("true"));
        assert_eq!(patch["theme"], json!(3));
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        let err = build_patch(HashMap::new(), b"[1, 2]", &defaults()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
        assert!(build_patch(HashMap::new(), b"  ", &defaults()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_numeric_looking_model_name_is_accepted() {
        let stubs = StubBackends::new();
        let (_dir, store, router) = test_router(&stubs);

        let request = Request::post("/config?whisper_model=2").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.snapshot().handles().transcription.name, "2");
    }

    #[tokio::test]
    async fn test_get_returns_full_document() {
        let stubs = StubBackends::new();
        let (_dir, _store, router) = test_router(&stubs);

        let response = router
            .oneshot(Request::get("/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let document: Value = serde_json::from_slice(&body).unwrap();
        for key in ["music_model", "BGM_duration", "whisper_model", "openai", "sd_payload"] {
            assert!(document.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_post_merges_persists_and_reloads() {
        let stubs = StubBackends::new();
        let (_dir, store, router) = test_router(&stubs);
        let before = store.snapshot();

        let request = Request::post("/config?BGM_duration=15")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"sd_payload": {"steps": 30}}"#))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let document: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(document["BGM_duration"], json!(15));
        assert_eq!(document["sd_payload"]["steps"], json!(30));
        // Nested merge keeps sibling keys
        assert_eq!(document["sd_payload"]["cfg_scale"], json!(7));

        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk, document);

        let after = store.snapshot();
        assert_eq!(after.handles().music.duration_secs, 15.0);
        assert!(!Arc::ptr_eq(&before.handles().music, &after.handles().music));
        assert!(Arc::ptr_eq(
            &before.handles().transcription,
            &after.handles().transcription
        ));
    }

    #[tokio::test]
    async fn test_invalid_update_returns_400() {
        let stubs = StubBackends::new();
        let (_dir, store, router) = test_router(&stubs);

        let request = Request::post("/config")
            .body(Body::from(r#"{"BGM_duration": "long"}"#))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["code"], "invalid_request");
        assert_eq!(store.get()["BGM_duration"], json!(8.0));
    }
}
