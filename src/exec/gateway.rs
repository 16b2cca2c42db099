use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::project_store_client::ProjectStore;
use crate::clients::runner_client::{RunOutput, RunnerError};
use crate::error::CollabError;
use crate::exec::queue::{new_request, Enqueued, ExecutionQueue, QueueStats, ResultSink};
use crate::models::{ExecutionRequest, ExecutionResult, ExecutionStatus, ExecutionStatusResponse, ExitInfo};

/// Maps whatever the runner produced to the one result shape callers see.
/// A process that ran and exited, with any code or signal, is `Completed`.
pub fn normalize(request: &ExecutionRequest, outcome: Result<RunOutput, RunnerError>, duration_ms: u64) -> ExecutionResult {
    match outcome {
        Ok(output) => ExecutionResult {
            request_id: request.request_id.clone(),
            project_id: request.project_id.clone(),
            status: ExecutionStatus::Completed,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_info: Some(ExitInfo {
                exit_code: output.exit_code,
                signal: output.signal,
            }),
            duration_ms,
            error: None,
        },
        Err(e) => {
            warn!("Runner fault for request {}: {}", request.request_id, e);
            ExecutionResult::without_output(request, ExecutionStatus::Failed, duration_ms, e.to_string())
        }
    }
}

/// Entry point for code execution requests bound to a project
pub struct ExecutionGateway {
    store: Arc<dyn ProjectStore>,
    queue: Arc<ExecutionQueue>,
}

impl ExecutionGateway {
    pub fn new(store: Arc<dyn ProjectStore>, queue: Arc<ExecutionQueue>) -> Self {
        Self { store, queue }
    }

    /// Queues `code` for execution and returns without waiting for it.
    /// The terminal result is pushed to `sink` exactly once.
    pub async fn submit(
        &self,
        project_id: &str,
        user_id: &str,
        code: String,
        request_id: Option<String>,
        sink: Option<ResultSink>,
    ) -> Result<Enqueued, CollabError> {
        if self.store.lookup(project_id, user_id).await?.is_none() {
            info!("Refusing execution for inaccessible project {} by {}", project_id, user_id);
            return Err(CollabError::RoomUnavailable(project_id.to_string()));
        }

        let request_id = request_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.queue.enqueue(new_request(request_id, project_id, user_id, code), sink)
    }

    /// Submits and waits for the terminal result.
    pub async fn execute(
        &self,
        project_id: &str,
        user_id: &str,
        code: String,
        request_id: Option<String>,
    ) -> Result<ExecutionResult, CollabError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let enqueued = self.submit(project_id, user_id, code, request_id, Some(tx)).await?;
        rx.recv().await.ok_or(CollabError::UnknownRequest(enqueued.request_id))
    }

    /// Cancels one of `user_id`'s requests
    pub fn cancel(&self, request_id: &str, user_id: &str) -> Result<ExecutionStatus, CollabError> {
        self.queue.cancel(request_id, user_id)
    }

    pub fn status(&self, request_id: &str, user_id: &str) -> Option<ExecutionStatusResponse> {
        self.queue.status(request_id, user_id)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::project_store_client::MemoryProjectStore;
    use crate::exec::queue::tests::{limits, policy, StubRunner};
    use std::time::Duration;
    use tokio::time::Instant;

    fn gateway(max_queued: usize, timeout_secs: u64) -> ExecutionGateway {
        let store = MemoryProjectStore::default().with_project("P1", "");
        let queue = ExecutionQueue::new(Arc::new(StubRunner::default()), limits(4, 1, max_queued), policy(timeout_secs));
        ExecutionGateway::new(Arc::new(store), queue)
    }

    #[test]
    fn nonzero_exit_is_still_completed() {
        let request = new_request("r1".to_string(), "P1", "u1", "exit(3)".to_string());
        let output = RunOutput {
            stdout: String::new(),
            stderr: "boom\n".to_string(),
            exit_code: Some(3),
            signal: None,
        };
        let result = normalize(&request, Ok(output), 12);
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.exit_info, Some(ExitInfo { exit_code: Some(3), signal: None }));
        assert_eq!(result.stderr, "boom\n");
    }

    #[test]
    fn malformed_runner_reply_is_failed() {
        let request = new_request("r1".to_string(), "P1", "u1", String::new());
        let result = normalize(&request, Err(RunnerError::Malformed("expected value".to_string())), 3);
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().contains("malformed"));
        assert!(result.exit_info.is_none());
    }

    #[tokio::test]
    async fn hello_world_completes() {
        let gateway = gateway(8, 10);
        let result = gateway.execute("P1", "u1", "print('hi')".to_string(), None).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.exit_info.unwrap().exit_code, Some(0));
    }

    #[tokio::test]
    async fn submit_returns_before_execution_finishes() {
        let gateway = gateway(8, 30);
        let enqueued = gateway.submit("P1", "u1", "hang".to_string(), Some("mine".to_string()), None).await.unwrap();
        assert_eq!(enqueued.request_id, "mine");
        assert_eq!(gateway.status("mine", "u1").unwrap().status, ExecutionStatus::Running);
        assert_eq!(gateway.cancel("mine", "u1").unwrap(), ExecutionStatus::Cancelled);
        assert_eq!(gateway.status("mine", "u1").unwrap().status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_project_is_refused() {
        let gateway = gateway(8, 10);
        let err = gateway.submit("P404", "u1", "x".to_string(), None, None).await.unwrap_err();
        assert!(matches!(err, CollabError::RoomUnavailable(_)));
        assert_eq!(gateway.stats(), QueueStats::default());
    }

    #[tokio::test]
    async fn reused_request_id_never_returns_another_users_output() {
        let store = MemoryProjectStore::default().with_project("P1", "").with_project("P2", "");
        let queue = ExecutionQueue::new(Arc::new(StubRunner::default()), limits(4, 1, 8), policy(10));
        let gateway = ExecutionGateway::new(Arc::new(store), queue);

        let alice = gateway.execute("P1", "alice", "secret-output".to_string(), Some("r-1".to_string())).await.unwrap();
        assert_eq!(alice.stdout, "secret-output\n");

        let err = gateway.execute("P2", "mallory", "print('x')".to_string(), Some("r-1".to_string())).await.unwrap_err();
        assert!(matches!(err, CollabError::RequestConflict(_)));
        assert!(gateway.status("r-1", "mallory").is_none());

        let again = gateway.execute("P1", "alice", "secret-output".to_string(), Some("r-1".to_string())).await.unwrap();
        assert_eq!(again, alice);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_runner_times_out_within_budget() {
        let gateway = gateway(8, 2);
        let before = gateway.stats();
        let start = Instant::now();

        let result = gateway.execute("P1", "u1", "hang".to_string(), None).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::TimedOut);
        assert!(start.elapsed() < Duration::from_millis(2_500));
        assert_eq!(gateway.stats(), before);
    }

    #[tokio::test]
    async fn fourth_submission_beyond_queue_bound_is_overloaded() {
        let gateway = gateway(2, 30);
        for _ in 0..3 {
            gateway.submit("P1", "u1", "hang".to_string(), None, None).await.unwrap();
        }
        let err = gateway.submit("P1", "u1", "hang".to_string(), None, None).await.unwrap_err();
        assert!(matches!(err, CollabError::Overloaded { .. }));
        assert_eq!(gateway.stats(), QueueStats { running: 1, queued: 2 });
    }
}
