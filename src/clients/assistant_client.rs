use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("assistant answered without a response")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    response: Option<String>,
}

/// Stateless forwarder to the external completion service
#[derive(Debug)]
pub struct AssistantClient {
    client: Client,
    url: String,
}

impl AssistantClient {
    pub fn new(url: String) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, url })
    }

    pub async fn ask(&self, message: &str) -> Result<String, AssistantError> {
        let reply: CompletionReply = self.client
            .post(&self.url)
            .json(&json!({ "message": message }))
            .send().await?
            .error_for_status()?
            .json().await?;
        reply.response.ok_or(AssistantError::Empty)
    }
}
