use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service accepts traffic", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Run code and wait for its result
#[utoipa::path(
    post,
    path = "/api/v1/execute",
    request_body = SubmitExecutionRequest,
    responses(
        (status = 200, description = "Terminal execution result", body = ExecutionResult),
        (status = 404, description = "Project unknown or not accessible", body = ErrorResponse),
        (status = 429, description = "Execution queue is full", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn execute_doc() {}

/// Queue code for execution
#[utoipa::path(
    post,
    path = "/api/v1/executions",
    request_body = SubmitExecutionRequest,
    responses(
        (status = 202, description = "Execution accepted", body = SubmitExecutionResponse),
        (status = 404, description = "Project unknown or not accessible", body = ErrorResponse),
        (status = 409, description = "Request id already used by another submission", body = ErrorResponse),
        (status = 429, description = "Execution queue is full", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn submit_execution_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/executions/{request_id}",
    params(("request_id" = String, Path, description = "Execution request id")),
    responses(
        (status = 200, description = "Current status, with the result once terminal", body = ExecutionStatusResponse),
        (status = 404, description = "Unknown or expired request", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn execution_status_doc() {}

#[utoipa::path(
    delete,
    path = "/api/v1/executions/{request_id}",
    params(("request_id" = String, Path, description = "Execution request id")),
    responses(
        (status = 200, description = "Status after the cancel", body = SubmitExecutionResponse),
        (status = 404, description = "Unknown or expired request", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn cancel_execution_doc() {}

/// Ask the coding assistant
#[utoipa::path(
    post,
    path = "/api/v1/assistant",
    request_body = AssistantRequest,
    responses(
        (status = 200, description = "Assistant answer", body = AssistantResponse),
        (status = 502, description = "Completion service failed", body = ErrorResponse),
        (status = 503, description = "No completion service configured", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn assistant_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Service diagnostics", body = DiagnosticsResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        execute_doc,
        submit_execution_doc,
        execution_status_doc,
        cancel_execution_doc,
        assistant_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            SubmitExecutionRequest,
            SubmitExecutionResponse,
            ExecutionStatusResponse,
            ExecutionResult,
            ExecutionStatus,
            ExitInfo,
            AssistantRequest,
            AssistantResponse,
            DiagnosticsResponse,
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
