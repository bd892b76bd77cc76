use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use crate::cache;
use crate::http::error::ApiError;
use crate::http::models::{
    CreateDeploymentRequest, CreateFunctionRequest, DeploymentResponse, FunctionListResponse,
    FunctionResponse, InvokeSourceRequest,
};
use crate::http::AppState;
use crate::id::new_function_id;
use crate::store;

pub async fn root() -> &'static str {
    "tinyfaas"
}

pub async fn invoke_source(
    State(_state): State<AppState>,
    Json(req): Json<InvokeSourceRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.source.trim().is_empty() {
        return Err(ApiError::Validation("source must not be empty".into()));
    }

    let payload_json = payload_to_json_text(req.payload);
    let result = cache::compile_and_invoke_source(req.source, payload_json).await?;
    let value: Value = serde_json::from_str(&result)
        .map_err(|e| ApiError::Engine(crate::error::EngineError::Serialization(e.to_string())))?;
    Ok(Json(value))
}

pub async fn create_function(
    State(state): State<AppState>,
    Json(req): Json<CreateFunctionRequest>,
) -> Result<Json<FunctionResponse>, ApiError> {
    let name = match req.name {
        Some(n) if n.trim().is_empty() => {
            return Err(ApiError::Validation("name must not be empty".into()))
        }
        Some(n) => n,
        None => new_function_id(),
    };

    let function = store::create_function(&state.pool, &name).await?;
    Ok(Json(FunctionResponse { function }))
}

pub async fn list_functions(
    State(state): State<AppState>,
) -> Result<Json<FunctionListResponse>, ApiError> {
    let functions = store::list_functions(&state.pool).await?;
    Ok(Json(FunctionListResponse { functions }))
}

pub async fn get_function(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FunctionResponse>, ApiError> {
    let function = store::get_function(&state.pool, &id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(FunctionResponse { function }))
}

pub async fn create_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateDeploymentRequest>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    if req.source.trim().is_empty() {
        return Err(ApiError::Validation("source must not be empty".into()));
    }

    let deployment = store::create_deployment(&state.pool, &id, &req.source)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(DeploymentResponse {
        deployment: deployment.into(),
    }))
}

pub async fn invoke_function(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Option<Value>>,
) -> Result<Json<Value>, ApiError> {
    let deployment = store::get_live_deployment(&state.pool, &id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if deployment.source.trim().is_empty() {
        return Err(ApiError::Validation("deployment has no source".into()));
    }

    let payload_json = payload_to_json_text(payload);
    let result = state
        .cache
        .invoke_function(&id, &deployment.id, deployment.source, payload_json)
        .await?;
    let value: Value = serde_json::from_str(&result)
        .map_err(|e| ApiError::Engine(crate::error::EngineError::Serialization(e.to_string())))?;
    Ok(Json(value))
}

/// Collapse "no body" and "body is JSON `null`" into `None`, so the
/// Isolate always sees `undefined` for either — only a present,
/// non-null value becomes JSON text for `JSON.parse`.
fn payload_to_json_text(payload: Option<Value>) -> Option<String> {
    match payload {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.to_string()),
    }
}
