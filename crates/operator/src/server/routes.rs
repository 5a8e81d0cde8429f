use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::AppState;
use crate::executor::update_env::UpdateEnvRequest;
use crate::model::LogLevel;
use crate::Error;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> String {
    crate::metrics::gather_metrics()
}

fn error_response(err: Error) -> Response {
    let status = match err {
        Error::TargetNotFound(_) => StatusCode::NOT_FOUND,
        Error::UnknownAnomalyType(_) | Error::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

pub async fn target_metrics(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
) -> Response {
    match state.metrics.collect(&target).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_lines")]
    lines: usize,
    level: Option<String>,
}

fn default_lines() -> usize {
    100
}

pub async fn target_logs(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let level = match query.level.as_deref() {
        None => None,
        Some(raw) => match LogLevel::parse(raw) {
            Some(level) => Some(level),
            None => {
                return error_response(Error::InvalidParameter(format!(
                    "unknown log level: {raw}"
                )))
            }
        },
    };

    match state.logs.fetch(&target, query.lines, level).await {
        Ok(entries) => {
            let total_lines = entries.len();
            Json(json!({
                "logs": entries,
                "total_lines": total_lines,
            }))
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

pub async fn detect_anomaly(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
) -> Response {
    match state.detector.detect(&target).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn get_runbook(
    State(state): State<Arc<AppState>>,
    Path(anomaly_type): Path<String>,
) -> Response {
    match state.runbooks.select_by_name(&anomaly_type) {
        Ok(runbook) => Json(runbook).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn action_history(State(state): State<Arc<AppState>>) -> Response {
    Json(state.validator.history()).into_response()
}

pub async fn clear_action_history(State(state): State<Arc<AppState>>) -> StatusCode {
    state.validator.clear_history();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct RestartRequest {
    pub container_id: String,
    pub reason: Option<String>,
}

pub async fn restart_container(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RestartRequest>,
) -> Response {
    let outcome = state
        .restart
        .run(&request.container_id, request.reason.as_deref())
        .await;
    Json(outcome).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub service_name: String,
    pub replicas: i32,
    pub reason: Option<String>,
}

pub async fn scale_service(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScaleRequest>,
) -> Response {
    let outcome = state
        .scale
        .run(&request.service_name, request.replicas, request.reason.as_deref())
        .await;
    Json(outcome).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpdateEnvVarsRequest {
    pub container_id: String,
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub restart: bool,
    #[serde(default)]
    pub force_restart: bool,
    pub reason: Option<String>,
}

pub async fn update_env_vars(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateEnvVarsRequest>,
) -> Response {
    let outcome = state
        .update_env
        .run(UpdateEnvRequest {
            target_id: &request.container_id,
            env_vars: &request.env_vars,
            restart: request.restart,
            force_restart: request.force_restart,
            reason: request.reason.as_deref(),
        })
        .await;
    Json(outcome).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub service_name: String,
    pub reason: Option<String>,
}

pub async fn rollback_deployment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RollbackRequest>,
) -> Response {
    let outcome = state
        .rollback
        .run(&request.service_name, request.reason.as_deref())
        .await;
    Json(outcome).into_response()
}
