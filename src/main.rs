mod auth;
mod clients;
mod config;
mod docs;
mod error;
mod exec;
mod handlers;
mod models;
mod routes;
mod services;
mod utils;
mod websocket;
mod ws;

use axum::http::HeaderValue;
use clients::assistant_client::AssistantClient;
use clients::project_store_client::{HttpProjectStore, OpenProjectStore, ProjectStore};
use clients::runner_client::{CodeRunner, HttpRunner, UnconfiguredRunner};
use config::Config;
use exec::gateway::ExecutionGateway;
use exec::queue::{ExecPolicy, ExecutionQueue, QueueLimits};
use routes::create_routes;
use std::panic;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ws::registry::SessionRegistry;
use ws::relay::BroadcastRelay;

/// Everything the HTTP and socket handlers share
pub struct AppState {
    pub config: Config,
    pub registry: Arc<SessionRegistry>,
    pub relay: BroadcastRelay,
    pub gateway: Arc<ExecutionGateway>,
    pub assistant: Option<Arc<AssistantClient>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ProjectStore>, runner: Arc<dyn CodeRunner>) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            store.clone(),
            config.heartbeat_timeout(),
            config.outbox_capacity,
        ));
        let relay = BroadcastRelay::new(registry.clone());

        let queue = ExecutionQueue::new(
            runner,
            QueueLimits {
                max_running: config.exec_max_running,
                max_running_per_project: config.exec_max_running_per_project,
                max_queued: config.exec_max_queued,
            },
            ExecPolicy {
                timeout: config.exec_timeout(),
                abort_timeout: config.exec_abort_timeout(),
                result_ttl: config.exec_result_ttl(),
            },
        );
        let gateway = Arc::new(ExecutionGateway::new(store, queue));

        let assistant = match config.assistant_url.clone() {
            Some(url) => match AssistantClient::new(url) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    error!("Failed to create assistant client: {}", e);
                    None
                }
            },
            None => None,
        };

        Self { config, registry, relay, gateway, assistant }
    }
}

fn project_store(config: &Config) -> Arc<dyn ProjectStore> {
    if let Some(url) = &config.project_store_url {
        match HttpProjectStore::new(url.clone(), config.auth_jwt_secret.clone(), config.service_name.clone()) {
            Ok(store) => {
                info!("Using project store at {}", url);
                return Arc::new(store);
            }
            Err(e) => error!("Failed to create project store client: {}", e),
        }
    }
    warn!("No project store configured - every project is open and starts from the welcome file");
    Arc::new(OpenProjectStore)
}

fn code_runner(config: &Config) -> Arc<dyn CodeRunner> {
    if let Some(url) = &config.runner_url {
        match HttpRunner::new(url) {
            Ok(runner) => {
                info!("Using code runner at {}", url);
                return Arc::new(runner);
            }
            Err(e) => error!("Failed to create runner client: {}", e),
        }
    }
    warn!("No code runner configured - executions will fail");
    Arc::new(UnconfiguredRunner)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() && config.is_development() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "codecollab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    let store = project_store(&config);
    let runner = code_runner(&config);
    let cors = cors_layer(&config);
    let address = config.server_address();

    let state = Arc::new(AppState::new(config, store, runner));
    let _reaper = state.registry.spawn_reaper();

    let app_routes = create_routes(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
