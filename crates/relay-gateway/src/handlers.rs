use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_common::{CallerIdentity, ErrorKind, ExecutionRequest, ExecutionResult, RuntimeOverrides};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::state::AppState;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    pub caller_identity: CallerIdentity,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub runtime_overrides: RuntimeOverrides,
}

pub fn status_for(result: &ExecutionResult) -> StatusCode {
    let Some(err) = &result.error else {
        return StatusCode::OK;
    };
    match err.kind {
        ErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::PermissionDenied | ErrorKind::DataSourceDenied => StatusCode::FORBIDDEN,
        ErrorKind::SchemaViolation | ErrorKind::UnsupportedExecutionType => StatusCode::BAD_REQUEST,
        ErrorKind::AgentNotFound => StatusCode::NOT_FOUND,
        ErrorKind::ExecutionTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::BackendError => StatusCode::BAD_GATEWAY,
    }
}

pub async fn execute(
    State(st): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<ExecuteBody>,
) -> Response {
    if body.caller_identity.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "callerIdentity.userId is required"}})),
        )
            .into_response();
    }

    let result = st
        .engine
        .execute(ExecutionRequest {
            agent_id,
            caller_identity: body.caller_identity,
            inputs: body.inputs,
            runtime_overrides: body.runtime_overrides,
        })
        .await;

    st.metrics.observe(&result);
    (status_for(&result), Json(result)).into_response()
}

pub async fn agent_summary(State(st): State<AppState>, Path(agent_id): Path<String>) -> Response {
    match st.telemetry.summary(&agent_id) {
        Some(s) => Json(json!({
            "agentId": agent_id,
            "invocations": s.invocations,
            "successes": s.successes,
            "failures": s.failures,
            "avgDurationMs": s.avg_duration_ms(),
            "maxDurationMs": s.max_duration_ms,
            "successRate": s.success_rate(),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"message": format!("no invocations recorded for '{agent_id}'")}})),
        )
            .into_response(),
    }
}
