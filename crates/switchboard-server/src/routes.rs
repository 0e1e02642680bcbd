//! HTTP API: evaluation and health endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tower_http::trace::TraceLayer;

use switchboard_core::{EvaluationContext, EvaluationResult, Evaluator, FlagId};
use switchboard_storage::SnapshotCache;

use crate::recorder::Recorder;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SnapshotCache>,
    pub evaluator: Evaluator,
    pub recorder: Arc<dyn Recorder>,
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/evaluation", post(evaluate))
        .route("/api/v1/evaluation/batch", post(evaluate_batch))
        .route("/api/v1/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Single-flag evaluation request.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalRequest {
    #[serde(rename = "flagID", default)]
    pub flag_id: Option<i64>,
    #[serde(rename = "flagKey", default)]
    pub flag_key: Option<String>,
    #[serde(rename = "entityID", default)]
    pub entity_id: Option<String>,
    #[serde(rename = "entityType", default)]
    pub entity_type: Option<String>,
    #[serde(rename = "entityContext", default)]
    pub entity_context: serde_json::Map<String, JsonValue>,
    #[serde(rename = "enableDebug", default)]
    pub enable_debug: bool,
}

impl EvalRequest {
    fn context(&self) -> EvaluationContext {
        EvaluationContext {
            entity_id: self.entity_id.clone(),
            entity_type: self.entity_type.clone(),
            entity_context: self.entity_context.clone(),
        }
    }
}

/// One entity of a batch evaluation request.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntity {
    #[serde(rename = "entityID", default)]
    pub entity_id: Option<String>,
    #[serde(rename = "entityType", default)]
    pub entity_type: Option<String>,
    #[serde(rename = "entityContext", default)]
    pub entity_context: serde_json::Map<String, JsonValue>,
}

impl BatchEntity {
    fn context(&self) -> EvaluationContext {
        EvaluationContext {
            entity_id: self.entity_id.clone(),
            entity_type: self.entity_type.clone(),
            entity_context: self.entity_context.clone(),
        }
    }
}

/// Batch evaluation request: every entity against every requested flag.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEvalRequest {
    #[serde(default)]
    pub entities: Vec<BatchEntity>,
    #[serde(rename = "flagIDs", default)]
    pub flag_ids: Vec<i64>,
    #[serde(rename = "flagKeys", default)]
    pub flag_keys: Vec<String>,
    #[serde(rename = "enableDebug", default)]
    pub enable_debug: bool,
}

/// Batch evaluation response, entity-major order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEvalResponse {
    #[serde(rename = "evaluationResults")]
    pub evaluation_results: Vec<EvaluationResult>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn evaluate(State(state): State<AppState>, Json(request): Json<EvalRequest>) -> Response {
    if request.flag_id.is_none() && request.flag_key.is_none() {
        return error_response(StatusCode::BAD_REQUEST, "flagID or flagKey is required");
    }

    let snapshot = state.cache.snapshot();
    let flag = request
        .flag_id
        .and_then(|id| snapshot.flag_by_id(FlagId(id)))
        .or_else(|| {
            request
                .flag_key
                .as_deref()
                .and_then(|key| snapshot.flag_by_key(key))
        });

    match flag {
        None => error_response(
            StatusCode::NOT_FOUND,
            format!(
                "flag not found: {}",
                request
                    .flag_key
                    .clone()
                    .unwrap_or_else(|| request.flag_id.unwrap_or_default().to_string())
            ),
        ),
        Some(flag) => {
            let context = request.context();
            let result = state.evaluator.evaluate(&flag, &context, request.enable_debug);
            state.recorder.record(&result);
            Json(result).into_response()
        },
    }
}

async fn evaluate_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchEvalRequest>,
) -> Response {
    if request.entities.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "entities is required");
    }
    if request.flag_ids.is_empty() && request.flag_keys.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "flagIDs or flagKeys is required");
    }

    let snapshot = state.cache.snapshot();
    let mut results =
        Vec::with_capacity(request.entities.len() * (request.flag_ids.len() + request.flag_keys.len()));

    for entity in &request.entities {
        let context = entity.context();
        for flag_id in &request.flag_ids {
            match snapshot.flag_by_id(FlagId(*flag_id)) {
                Some(flag) => {
                    let result =
                        state.evaluator.evaluate(&flag, &context, request.enable_debug);
                    state.recorder.record(&result);
                    results.push(result);
                },
                None => results.push(EvaluationResult::flag_not_found(
                    Some(FlagId(*flag_id)),
                    None,
                    &context,
                    request.enable_debug,
                )),
            }
        }
        for flag_key in &request.flag_keys {
            match snapshot.flag_by_key(flag_key) {
                Some(flag) => {
                    let result =
                        state.evaluator.evaluate(&flag, &context, request.enable_debug);
                    state.recorder.record(&result);
                    results.push(result);
                },
                None => results.push(EvaluationResult::flag_not_found(
                    None,
                    Some(flag_key.clone()),
                    &context,
                    request.enable_debug,
                )),
            }
        }
    }

    Json(BatchEvalResponse {
        evaluation_results: results,
    })
    .into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.cache.snapshot();
    Json(json!({
        "status": "ok",
        "snapshotVersion": snapshot.version(),
        "flags": snapshot.len(),
        "reloadFailures": state.cache.reload_failures(),
    }))
    .into_response()
}
