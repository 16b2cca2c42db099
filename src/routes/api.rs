use crate::{
    docs::ApiDoc,
    handlers::{assistant, cancel_execution, diagnostics, execute, execution_status, health_check, ready_check, submit_execution},
    routes::auth_middleware::auth_middleware,
    websocket::handler::websocket_handler,
    AppState,
};
use axum::{routing::{get, post}, Router, middleware};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Routes under /api that need an authenticated caller
fn protected_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/execute", post(execute))
        .route("/v1/executions", post(submit_execution))
        .route("/v1/executions/:request_id", get(execution_status).delete(cancel_execution))
        .route("/v1/assistant", post(assistant))
        .route("/v1/diagnostics", get(diagnostics))
}

/// Create all routes
pub fn create_routes(state: Arc<AppState>) -> Router {
    let auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let api_routes = Router::new()
        .merge(protected_api_routes().route_layer(auth.clone()))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check));

    Router::new()
        .route("/ws", get(websocket_handler))
        .route_layer(auth)
        // Mount API routes
        .nest("/api", api_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::assistant_client::tests::spawn_completion_service;
    use crate::clients::project_store_client::MemoryProjectStore;
    use crate::config::Config;
    use crate::exec::queue::tests::StubRunner;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use reqwest::{Method, StatusCode};
    use serde_json::{json, Value};

    const SECRET: &str = "route-test-secret";

    async fn spawn_app(config: Config) -> String {
        let store = MemoryProjectStore::default().with_project("P1", "").with_project("P2", "");
        let app = create_routes(Arc::new(AppState::new(config, Arc::new(store), Arc::new(StubRunner::default()))));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    fn dev_config(max_queued: usize) -> Config {
        Config { exec_max_queued: max_queued, ..Config::default() }
    }

    fn secured_config() -> Config {
        Config { auth_jwt_secret: Some(SECRET.to_string()), ..Config::default() }
    }

    fn token(user: &str) -> String {
        let exp = chrono::Utc::now().timestamp() + 300;
        encode(&Header::default(), &json!({"sub": user, "exp": exp}), &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn call(base: &str, method: Method, path: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = reqwest::Client::new().request(method, format!("{}{}", base, path));
        if let Some(user) = user {
            request = request.bearer_auth(token(user));
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let base = spawn_app(secured_config()).await;
        let (status, body) = call(&base, Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = call(&base, Method::POST, "/api/v1/execute", None, Some(json!({"projectId": "P1", "code": "x"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn synchronous_execute_returns_result() {
        let base = spawn_app(dev_config(8)).await;
        let (status, body) = call(&base, Method::POST, "/api/v1/execute", None, Some(json!({"projectId": "P1", "code": "print('hi')"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["stdout"], "hi\n");
        assert_eq!(body["exitInfo"]["exitCode"], 0);
    }

    #[tokio::test]
    async fn submit_poll_and_cancel() {
        let base = spawn_app(dev_config(8)).await;
        let (status, body) = call(&base, Method::POST, "/api/v1/executions", None, Some(json!({"projectId": "P1", "code": "hang", "requestId": "r-9"}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["requestId"], "r-9");

        let (status, body) = call(&base, Method::GET, "/api/v1/executions/r-9", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");

        let (status, body) = call(&base, Method::DELETE, "/api/v1/executions/r-9", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");

        let (_, body) = call(&base, Method::GET, "/api/v1/executions/r-9", None, None).await;
        assert_eq!(body["result"]["status"], "cancelled");

        let (status, _) = call(&base, Method::GET, "/api/v1/executions/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn executions_are_private_to_their_submitter() {
        let base = spawn_app(secured_config()).await;
        let (status, body) = call(&base, Method::POST, "/api/v1/execute", Some("alice"), Some(json!({"projectId": "P1", "code": "secret-output", "requestId": "r-1"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stdout"], "secret-output\n");

        let (status, body) = call(&base, Method::POST, "/api/v1/execute", Some("mallory"), Some(json!({"projectId": "P2", "code": "print('x')", "requestId": "r-1"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.get("stdout").is_none());

        let (status, _) = call(&base, Method::GET, "/api/v1/executions/r-1", Some("mallory"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        call(&base, Method::POST, "/api/v1/executions", Some("alice"), Some(json!({"projectId": "P1", "code": "hang", "requestId": "r-2"}))).await;
        let (status, _) = call(&base, Method::DELETE, "/api/v1/executions/r-2", Some("mallory"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, body) = call(&base, Method::GET, "/api/v1/executions/r-2", Some("alice"), None).await;
        assert_eq!(body["status"], "running");
    }

    #[tokio::test]
    async fn overload_and_unknown_project_map_to_statuses() {
        let base = spawn_app(dev_config(1)).await;
        for _ in 0..2 {
            let (status, _) = call(&base, Method::POST, "/api/v1/executions", None, Some(json!({"projectId": "P1", "code": "hang"}))).await;
            assert_eq!(status, StatusCode::ACCEPTED);
        }
        let (status, body) = call(&base, Method::POST, "/api/v1/executions", None, Some(json!({"projectId": "P1", "code": "hang"}))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], 429);

        let (status, _) = call(&base, Method::POST, "/api/v1/executions", None, Some(json!({"projectId": "P3", "code": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_and_assistant_routes_guarded() {
        let base = spawn_app(dev_config(8)).await;
        let (status, _) = call(&base, Method::GET, "/api/v1/diagnostics", None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&base, Method::POST, "/api/v1/assistant", None, Some(json!({"message": "hi"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn assistant_answers_are_forwarded() {
        let config = Config { assistant_url: Some(spawn_completion_service().await), ..Config::default() };
        let base = spawn_app(config).await;

        let (status, body) = call(&base, Method::POST, "/api/v1/assistant", None, Some(json!({"message": "loops?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"response": "you asked: loops?", "type": "ai_assistant"}));

        let (status, _) = call(&base, Method::POST, "/api/v1/assistant", None, Some(json!({"message": "silent"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
