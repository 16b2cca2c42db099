use crate::{auth::auth::Principal, error::error_response, models::{ErrorResponse, ExecutionResult, ExecutionStatusResponse, SubmitExecutionRequest, SubmitExecutionResponse}, AppState};
use axum::{extract::{Extension, Path, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

fn validate(request: &SubmitExecutionRequest) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if request.project_id.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "projectId must not be empty"));
    }
    Ok(())
}

/// Run code and wait for the terminal result
pub async fn execute(
    State(app_state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<SubmitExecutionRequest>,
) -> Result<(StatusCode, Json<ExecutionResult>), (StatusCode, Json<ErrorResponse>)> {
    validate(&request)?;

    let result = app_state.gateway
        .execute(&request.project_id, &principal.user_id, request.code, request.request_id)
        .await
        .map_err(|e| e.to_response())?;

    info!("Execution {} for project {} ended as {:?}", result.request_id, result.project_id, result.status);
    Ok((StatusCode::OK, Json(result)))
}

/// Queue code for execution without waiting
pub async fn submit_execution(
    State(app_state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<SubmitExecutionRequest>,
) -> Result<(StatusCode, Json<SubmitExecutionResponse>), (StatusCode, Json<ErrorResponse>)> {
    validate(&request)?;

    let enqueued = app_state.gateway
        .submit(&request.project_id, &principal.user_id, request.code, request.request_id, None)
        .await
        .map_err(|e| e.to_response())?;

    Ok((StatusCode::ACCEPTED, Json(SubmitExecutionResponse {
        request_id: enqueued.request_id,
        status: enqueued.status,
    })))
}

/// Status of one of the caller's executions
pub async fn execution_status(
    State(app_state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(request_id): Path<String>,
) -> Result<(StatusCode, Json<ExecutionStatusResponse>), (StatusCode, Json<ErrorResponse>)> {
    match app_state.gateway.status(&request_id, &principal.user_id) {
        Some(status) => Ok((StatusCode::OK, Json(status))),
        None => Err(error_response(StatusCode::NOT_FOUND, format!("execution request '{}' is unknown", request_id))),
    }
}

pub async fn cancel_execution(
    State(app_state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(request_id): Path<String>,
) -> Result<(StatusCode, Json<SubmitExecutionResponse>), (StatusCode, Json<ErrorResponse>)> {
    let status = app_state.gateway.cancel(&request_id, &principal.user_id).map_err(|e| e.to_response())?;
    info!("Cancel of {} by {} left it {:?}", request_id, principal.user_id, status);
    Ok((StatusCode::OK, Json(SubmitExecutionResponse { request_id, status })))
}
