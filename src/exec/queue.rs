use chrono::Utc;
use moka::sync::Cache;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clients::runner_client::{CodeRunner, RunJob, RunOutput, RunnerError};
use crate::error::CollabError;
use crate::exec::gateway::normalize;
use crate::models::{ExecutionRequest, ExecutionResult, ExecutionStatus, ExecutionStatusResponse};
use crate::utils::scope_guard::ScopeGuard;

/// Receives the terminal result of a request
pub type ResultSink = mpsc::UnboundedSender<ExecutionResult>;

#[derive(Debug, Clone, Copy)]
pub struct QueueLimits {
    pub max_running: usize,
    pub max_running_per_project: usize,
    /// Requests waiting for a slot beyond this are refused
    pub max_queued: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecPolicy {
    pub timeout: Duration,
    /// Bound on waiting for the runner to confirm an abort
    pub abort_timeout: Duration,
    pub result_ttl: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub running: usize,
    pub queued: usize,
}

/// What `enqueue` did with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub request_id: String,
    pub status: ExecutionStatus,
    /// The id was already known; nothing new was queued
    pub duplicate: bool,
}

struct Entry {
    request: Arc<ExecutionRequest>,
    status: ExecutionStatus,
    sinks: Vec<ResultSink>,
    cancel: Option<oneshot::Sender<()>>,
    started_at: Option<Instant>,
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<String, Entry>,
    /// Queued request ids, oldest first
    waiting: VecDeque<String>,
    running: usize,
    running_by_project: HashMap<String, usize>,
}

/// A request that just moved to `Running` and needs a worker
struct Started {
    request: Arc<ExecutionRequest>,
    cancel_rx: oneshot::Receiver<()>,
}

enum Outcome {
    Finished(Result<RunOutput, RunnerError>),
    TimedOut,
    Cancelled,
}

/// Owns the lifecycle of every execution request and bounds how many run at once.
///
/// State lives behind a std mutex that is never held across an await, so
/// the cleanup path of a dying worker can release its slot from `Drop`.
pub struct ExecutionQueue {
    state: Mutex<QueueState>,
    limits: QueueLimits,
    policy: ExecPolicy,
    runner: Arc<dyn CodeRunner>,
    finished: Cache<String, (Arc<ExecutionRequest>, ExecutionResult)>,
}

impl ExecutionQueue {
    pub fn new(runner: Arc<dyn CodeRunner>, limits: QueueLimits, policy: ExecPolicy) -> Arc<Self> {
        let limits = QueueLimits {
            max_running: limits.max_running.max(1),
            max_running_per_project: limits.max_running_per_project.max(1),
            max_queued: limits.max_queued,
        };
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            limits,
            policy,
            runner,
            finished: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(policy.result_ttl)
                .build(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned lock still holds consistent counters; every mutation
        // completes before anything that could panic.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues a request, starting it right away when capacity allows.
    /// Known ids are not queued twice; a retained result is re-delivered.
    pub fn enqueue(self: &Arc<Self>, request: ExecutionRequest, sink: Option<ResultSink>) -> Result<Enqueued, CollabError> {
        let request_id = request.request_id.clone();
        let started = {
            let mut state = self.lock();

            if let Some(entry) = state.entries.get_mut(&request_id) {
                if !is_retry_of(&request, &entry.request) {
                    warn!("Request id {} reused by {} for project {}", request_id, request.user_id, request.project_id);
                    return Err(CollabError::RequestConflict(request_id));
                }
                debug!("Request {} already {:?}, attaching to it", request_id, entry.status);
                entry.sinks.extend(sink);
                return Ok(Enqueued { request_id, status: entry.status, duplicate: true });
            }
            if let Some((original, result)) = self.finished.get(&request_id) {
                if !is_retry_of(&request, &original) {
                    warn!("Request id {} reused by {} for project {}", request_id, request.user_id, request.project_id);
                    return Err(CollabError::RequestConflict(request_id));
                }
                debug!("Request {} already finished, re-delivering", request_id);
                let status = result.status;
                if let Some(sink) = sink {
                    let _ = sink.send(result);
                }
                return Ok(Enqueued { request_id, status, duplicate: true });
            }

            if state.waiting.len() >= self.limits.max_queued && !self.can_start_now(&state, &request.project_id) {
                warn!("Refusing request {} for project {}: {} queued", request_id, request.project_id, state.waiting.len());
                return Err(CollabError::Overloaded {
                    queued: state.waiting.len(),
                    limit: self.limits.max_queued,
                });
            }

            info!("Queued request {} for project {} by {}", request_id, request.project_id, request.user_id);
            state.waiting.push_back(request_id.clone());
            state.entries.insert(request_id.clone(), Entry {
                request: Arc::new(request),
                status: ExecutionStatus::Queued,
                sinks: sink.into_iter().collect(),
                cancel: None,
                started_at: None,
            });
            self.dispatch_locked(&mut state)
        };

        let status = if started.iter().any(|s| s.request.request_id == request_id) {
            ExecutionStatus::Running
        } else {
            ExecutionStatus::Queued
        };
        self.spawn_workers(started);
        Ok(Enqueued { request_id, status, duplicate: false })
    }

    /// Moves a queued or running request of `user_id` to `Cancelled`. Requests
    /// that already reached a terminal state are left alone and their status
    /// returned. Other users' requests are reported as unknown.
    pub fn cancel(self: &Arc<Self>, request_id: &str, user_id: &str) -> Result<ExecutionStatus, CollabError> {
        let started = {
            let mut state = self.lock();
            let Some(entry) = state.entries.get_mut(request_id).filter(|e| e.request.user_id == user_id) else {
                return match self.finished.get(request_id) {
                    Some((request, result)) if request.user_id == user_id => Ok(result.status),
                    _ => Err(CollabError::UnknownRequest(request_id.to_string())),
                };
            };

            let duration_ms = entry.started_at.map(elapsed_ms).unwrap_or(0);
            if let Some(cancel) = entry.cancel.take() {
                // The worker aborts the runner once it sees this.
                let _ = cancel.send(());
            }
            let result = ExecutionResult::without_output(&entry.request, ExecutionStatus::Cancelled, duration_ms, "execution cancelled");
            info!("Cancelled request {}", request_id);
            self.complete_locked(&mut state, request_id, result)
        };
        self.spawn_workers(started);
        Ok(ExecutionStatus::Cancelled)
    }

    /// Records the terminal result of a running request. Returns false when
    /// the request already ended, for example through `cancel`.
    fn finish(self: &Arc<Self>, request_id: &str, build: impl FnOnce(&ExecutionRequest, u64) -> ExecutionResult) -> bool {
        let started = {
            let mut state = self.lock();
            let Some(entry) = state.entries.get(request_id) else {
                return false;
            };
            let duration_ms = entry.started_at.map(elapsed_ms).unwrap_or(0);
            let result = build(&entry.request, duration_ms);
            if !entry.status.can_transition_to(result.status) {
                error!("Dropping invalid transition {:?} -> {:?} for {}", entry.status, result.status, request_id);
                return false;
            }
            self.complete_locked(&mut state, request_id, result)
        };
        self.spawn_workers(started);
        true
    }

    /// Current status of one of `user_id`'s requests, with the result once terminal
    pub fn status(&self, request_id: &str, user_id: &str) -> Option<ExecutionStatusResponse> {
        if let Some(entry) = self.lock().entries.get(request_id) {
            return (entry.request.user_id == user_id)
                .then(|| status_response(&entry.request, entry.status, None));
        }
        self.finished
            .get(request_id)
            .filter(|(request, _)| request.user_id == user_id)
            .map(|(request, result)| status_response(&request, result.status, Some(result)))
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            running: state.running,
            queued: state.waiting.len(),
        }
    }

    fn can_start_now(&self, state: &QueueState, project_id: &str) -> bool {
        state.running < self.limits.max_running
            && state.running_by_project.get(project_id).copied().unwrap_or(0) < self.limits.max_running_per_project
            && !state.waiting.iter().any(|id| {
                state.entries.get(id).is_some_and(|e| e.request.project_id == project_id)
            })
    }

    /// Removes a request, releases its slot if it held one, delivers its
    /// result and refills free slots.
    fn complete_locked(&self, state: &mut QueueState, request_id: &str, result: ExecutionResult) -> Vec<Started> {
        let Some(entry) = state.entries.remove(request_id) else {
            return Vec::new();
        };

        match entry.status {
            ExecutionStatus::Queued => state.waiting.retain(|id| id != request_id),
            ExecutionStatus::Running => {
                state.running = state.running.saturating_sub(1);
                let project_id = &entry.request.project_id;
                if let Some(count) = state.running_by_project.get_mut(project_id) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        state.running_by_project.remove(project_id);
                    }
                }
            }
            _ => {}
        }

        info!(
            "Request {} finished as {:?} after {} ms",
            request_id, result.status, result.duration_ms
        );
        for sink in &entry.sinks {
            if sink.send(result.clone()).is_err() {
                debug!("Result listener for {} went away", request_id);
            }
        }
        self.finished.insert(request_id.to_string(), (entry.request, result));
        self.dispatch_locked(state)
    }

    /// Starts the oldest waiting requests whose project has a free slot.
    fn dispatch_locked(&self, state: &mut QueueState) -> Vec<Started> {
        let mut started = Vec::new();
        while state.running < self.limits.max_running {
            let next = state.waiting.iter().position(|id| {
                state.entries.get(id).is_some_and(|entry| {
                    state.running_by_project.get(&entry.request.project_id).copied().unwrap_or(0)
                        < self.limits.max_running_per_project
                })
            });
            let Some(idx) = next else {
                break;
            };
            let Some(request_id) = state.waiting.remove(idx) else {
                break;
            };
            let Some(entry) = state.entries.get_mut(&request_id) else {
                continue;
            };

            let (cancel_tx, cancel_rx) = oneshot::channel();
            entry.status = ExecutionStatus::Running;
            entry.started_at = Some(Instant::now());
            entry.cancel = Some(cancel_tx);
            let request = entry.request.clone();

            state.running += 1;
            *state.running_by_project.entry(request.project_id.clone()).or_insert(0) += 1;
            debug!("Request {} is running ({} running)", request_id, state.running);
            started.push(Started { request, cancel_rx });
        }
        started
    }

    fn spawn_workers(self: &Arc<Self>, started: Vec<Started>) {
        if started.is_empty() {
            return;
        }
        // Cleanup guards may run while the runtime is being torn down.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!("No runtime to start {} queued requests on", started.len());
            return;
        };
        for job in started {
            handle.spawn(self.clone().work(job));
        }
    }

    async fn work(self: Arc<Self>, job: Started) {
        let Started { request, cancel_rx } = job;
        let request_id = request.request_id.clone();

        // Whatever happens to this task, the slot is released and a result produced.
        let queue = self.clone();
        let guard_id = request_id.clone();
        let guard = ScopeGuard::new(move || {
            if queue.finish(&guard_id, |req, duration_ms| {
                ExecutionResult::without_output(req, ExecutionStatus::Failed, duration_ms, "execution worker stopped unexpectedly")
            }) {
                error!("Worker for {} stopped without reporting", guard_id);
            }
        });

        let run = self.runner.run(RunJob {
            request_id: request_id.clone(),
            code: request.code.clone(),
            timeout_ms: self.policy.timeout.as_millis() as u64,
        });

        let outcome = tokio::select! {
            res = tokio::time::timeout(self.policy.timeout, run) => match res {
                Ok(res) => Outcome::Finished(res),
                Err(_) => Outcome::TimedOut,
            },
            _ = cancel_rx => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Finished(res) => {
                self.finish(&request_id, |req, duration_ms| normalize(req, res, duration_ms));
            }
            Outcome::TimedOut => {
                warn!("Request {} timed out after {:?}", request_id, self.policy.timeout);
                self.abort_runner(&request_id).await;
                let timeout = self.policy.timeout;
                self.finish(&request_id, |req, duration_ms| {
                    ExecutionResult::without_output(
                        req,
                        ExecutionStatus::TimedOut,
                        duration_ms,
                        format!("execution timed out after {} s", timeout.as_secs_f64()),
                    )
                });
            }
            Outcome::Cancelled => self.abort_runner(&request_id).await,
        }
        guard.disarm();
    }

    async fn abort_runner(&self, request_id: &str) {
        match tokio::time::timeout(self.policy.abort_timeout, self.runner.abort(request_id)).await {
            Ok(Ok(())) => debug!("Runner released {}", request_id),
            Ok(Err(e)) => warn!("Runner abort of {} failed: {}", request_id, e),
            Err(_) => warn!("Runner abort of {} did not answer in {:?}", request_id, self.policy.abort_timeout),
        }
    }
}

/// A reused id only refers to the same execution when the same user submits
/// it for the same project.
fn is_retry_of(request: &ExecutionRequest, original: &ExecutionRequest) -> bool {
    request.user_id == original.user_id && request.project_id == original.project_id
}

fn elapsed_ms(started_at: Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}

fn status_response(request: &ExecutionRequest, status: ExecutionStatus, result: Option<ExecutionResult>) -> ExecutionStatusResponse {
    ExecutionStatusResponse {
        request_id: request.request_id.clone(),
        project_id: request.project_id.clone(),
        status,
        submitted_at: request.submitted_at,
        result,
    }
}

/// Builds a request stamped with the current time
pub fn new_request(request_id: String, project_id: &str, user_id: &str, code: String) -> ExecutionRequest {
    ExecutionRequest {
        request_id,
        project_id: project_id.to_string(),
        user_id: user_id.to_string(),
        code,
        submitted_at: Utc::now(),
    }
}
