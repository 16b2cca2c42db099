use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runner fault: {0}")]
    Fault(String),

    #[error("runner returned a malformed response: {0}")]
    Malformed(String),

    #[error("no code runner is configured")]
    Unavailable,
}

/// Code handed to the sandbox for one execution request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJob {
    pub request_id: String,
    pub code: String,
    pub timeout_ms: u64,
}

/// What the sandbox reports once the process ended
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

/// An isolated, possibly slow or unresponsive, code execution capability.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, job: RunJob) -> Result<RunOutput, RunnerError>;

    /// Ask the sandbox to kill whatever is left of `request_id`.
    async fn abort(&self, request_id: &str) -> Result<(), RunnerError>;
}

/// Runner reached over HTTP
#[derive(Debug)]
pub struct HttpRunner {
    client: Client,
    base_url: Url,
}

impl HttpRunner {
    pub fn new(base_url: &str) -> Result<Self, RunnerError> {
        // Each call is bounded by the execution timeout, not by the client.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RunnerError::Fault(e.to_string()))?;
        let base_url = Url::parse(base_url).map_err(|e| RunnerError::Fault(format!("invalid runner url: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RunnerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RunnerError::Fault(format!("'{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl CodeRunner for HttpRunner {
    async fn run(&self, job: RunJob) -> Result<RunOutput, RunnerError> {
        let url = self.endpoint(&["run"])?;
        debug!("Dispatching {} to runner", job.request_id);

        let response = self.client.post(url).json(&job).send().await
            .map_err(|e| RunnerError::Fault(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RunnerError::Fault(format!("runner answered {}: {}", status, body)));
        }

        let body = response.bytes().await.map_err(|e| RunnerError::Fault(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| RunnerError::Malformed(e.to_string()))
    }

    async fn abort(&self, request_id: &str) -> Result<(), RunnerError> {
        let url = self.endpoint(&["abort", request_id])?;
        let response = self.client.post(url).send().await
            .map_err(|e| RunnerError::Fault(e.to_string()))?;

        if !response.status().is_success() {
            warn!("Runner refused abort of {}: {}", request_id, response.status());
            return Err(RunnerError::Fault(format!("abort answered {}", response.status())));
        }
        Ok(())
    }
}

/// Runner used when none is configured; every run fails.
#[derive(Debug, Default)]
pub struct UnconfiguredRunner;

#[async_trait]
impl CodeRunner for UnconfiguredRunner {
    async fn run(&self, _job: RunJob) -> Result<RunOutput, RunnerError> {
        Err(RunnerError::Unavailable)
    }

    async fn abort(&self, _request_id: &str) -> Result<(), RunnerError> {
        Ok(())
    }
}
