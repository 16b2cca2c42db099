use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// HS256 secret shared with the auth service
    pub auth_jwt_secret: Option<String>,

    /// Base URL of the project store
    pub project_store_url: Option<String>,

    /// Base URL of the sandboxed code runner
    pub runner_url: Option<String>,

    /// Completion endpoint the assistant proxy forwards to
    pub assistant_url: Option<String>,

    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,

    #[serde(default = "default_exec_abort_timeout_secs")]
    pub exec_abort_timeout_secs: u64,

    #[serde(default = "default_exec_max_running")]
    pub exec_max_running: usize,

    #[serde(default = "default_exec_max_running_per_project")]
    pub exec_max_running_per_project: usize,

    /// Upper bound on queued (not yet running) executions
    #[serde(default = "default_exec_max_queued")]
    pub exec_max_queued: usize,

    /// How long terminal results stay available for polling and retries
    #[serde(default = "default_exec_result_ttl_secs")]
    pub exec_result_ttl_secs: u64,

    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,

    /// Per-connection outbound queue length
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn exec_abort_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_abort_timeout_secs)
    }

    pub fn exec_result_ttl(&self) -> Duration {
        Duration::from_secs(self.exec_result_ttl_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            cors_origins: None,
            service_name: default_service_name(),
            auth_jwt_secret: None,
            project_store_url: None,
            runner_url: None,
            assistant_url: None,
            exec_timeout_secs: default_exec_timeout_secs(),
            exec_abort_timeout_secs: default_exec_abort_timeout_secs(),
            exec_max_running: default_exec_max_running(),
            exec_max_running_per_project: default_exec_max_running_per_project(),
            exec_max_queued: default_exec_max_queued(),
            exec_result_ttl_secs: default_exec_result_ttl_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_service_name() -> String {
    "codecollab".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_exec_timeout_secs() -> u64 {
    30
}

fn default_exec_abort_timeout_secs() -> u64 {
    5
}

fn default_exec_max_running() -> usize {
    4
}

fn default_exec_max_running_per_project() -> usize {
    1
}

fn default_exec_max_queued() -> usize {
    32
}

fn default_exec_result_ttl_secs() -> u64 {
    600
}

fn default_heartbeat_timeout_secs() -> u64 {
    60
}

fn default_outbox_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server_address(), "0.0.0.0:8000");
        assert!(config.is_development());
        assert_eq!(config.exec_max_running_per_project, 1);
        assert_eq!(config.exec_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = Config {
            cors_origins: Some("http://localhost:3000, http://127.0.0.1:3000,".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.cors_origin_list(),
            vec!["http://localhost:3000".to_string(), "http://127.0.0.1:3000".to_string()]
        );
    }
}
