use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of an execution request.
///
/// `Queued -> Running -> Completed | Failed | TimedOut`, and
/// `Queued | Running -> Cancelled`. The last four are terminal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::TimedOut
                | ExecutionStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Cancelled)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub request_id: String,
    pub project_id: String,
    pub user_id: String,
    pub code: String,
    pub submitted_at: DateTime<Utc>,
}

/// How the runner's process ended
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

/// The single terminal outcome of an execution request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub request_id: String,
    pub project_id: String,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_info: Option<ExitInfo>,
    pub duration_ms: u64,
    /// Diagnostic detail for failed, timed out or cancelled runs
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn without_output(
        request: &ExecutionRequest,
        status: ExecutionStatus,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request.request_id.clone(),
            project_id: request.project_id.clone(),
            status,
            stdout: String::new(),
            stderr: String::new(),
            exit_info: None,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

/// Body of the execute endpoints
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitExecutionRequest {
    pub project_id: String,
    pub code: String,
    pub request_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitExecutionResponse {
    pub request_id: String,
    pub status: ExecutionStatus,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatusResponse {
    pub request_id: String,
    pub project_id: String,
    pub status: ExecutionStatus,
    pub submitted_at: DateTime<Utc>,
    pub result: Option<ExecutionResult>,
}
