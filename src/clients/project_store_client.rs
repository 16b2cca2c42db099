use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::StoreError;

/// File content new projects start with
pub const WELCOME_CONTENT: &str = "# Welcome to Python Web IDE!\nprint('Hello World')";

/// What the project store knows about a project a user may access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    /// Stored content of the project's main file
    #[serde(default)]
    pub content: String,
}

/// Answers whether a project exists and whether a user may access it.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// `Ok(None)` when the project is unknown or the user has no access.
    async fn lookup(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectInfo>, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

/// Project store reached over HTTP
#[derive(Debug)]
pub struct HttpProjectStore {
    client: Client,
    base_url: String,
    jwt_secret: Option<String>,
    service_name: String,
}

impl HttpProjectStore {
    pub fn new(base_url: String, jwt_secret: Option<String>, service_name: String) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            jwt_secret,
            service_name,
        })
    }

    fn generate_token(&self, secret: &str) -> Result<String, StoreError> {
        // 1 minute expiration
        let expiration = (Utc::now() + Duration::seconds(60)).timestamp();

        let claims = Claims {
            sub: self.service_name.clone(),
            type_: "service".to_string(),
            exp: expiration as usize,
        };

        Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
    }

    fn access_url(&self, project_id: &str, user_id: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| StoreError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Url(format!("'{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["projects", project_id, "access", user_id]);
        Ok(url)
    }
}

#[async_trait]
impl ProjectStore for HttpProjectStore {
    async fn lookup(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectInfo>, StoreError> {
        let url = self.access_url(project_id, user_id)?;
        let mut request = self.client.get(url);
        if let Some(secret) = &self.jwt_secret {
            request = request.header("Authorization", format!("Bearer {}", self.generate_token(secret)?));
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                debug!("Project {} not accessible for user {}", project_id, user_id);
                Ok(None)
            }
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => {
                error!("Project store lookup for {} failed with {}", project_id, status);
                Err(StoreError::Status(status.as_u16()))
            }
        }
    }
}

/// Store used when no project store is configured: every project exists
/// and starts from the welcome file.
#[derive(Debug, Default)]
pub struct OpenProjectStore;

#[async_trait]
impl ProjectStore for OpenProjectStore {
    async fn lookup(&self, project_id: &str, _user_id: &str) -> Result<Option<ProjectInfo>, StoreError> {
        Ok(Some(ProjectInfo {
            project_id: project_id.to_string(),
            name: project_id.to_string(),
            content: WELCOME_CONTENT.to_string(),
        }))
    }
}

/// Fixed set of projects, every user may access all of them.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl MemoryProjectStore {
    pub fn with_project(mut self, project_id: &str, content: &str) -> Self {
        self.projects.insert(project_id.to_string(), content.to_string());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn lookup(&self, project_id: &str, _user_id: &str) -> Result<Option<ProjectInfo>, StoreError> {
        Ok(self.projects.get(project_id).map(|content| ProjectInfo {
            project_id: project_id.to_string(),
            name: project_id.to_string(),
            content: content.clone(),
        }))
    }
}
