use crate::{error::error_response, models::{AssistantRequest, AssistantResponse, ErrorResponse}, AppState};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::error;

const RESPONSE_KIND: &str = "ai_assistant";

/// Forward a question to the completion service
pub async fn assistant(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<AssistantRequest>,
) -> Result<(StatusCode, Json<AssistantResponse>), (StatusCode, Json<ErrorResponse>)> {
    let Some(client) = &app_state.assistant else {
        return Err(error_response(StatusCode::SERVICE_UNAVAILABLE, "No assistant service configured"));
    };

    match client.ask(&request.message).await {
        Ok(response) => Ok((StatusCode::OK, Json(AssistantResponse {
            response,
            kind: RESPONSE_KIND.to_string(),
        }))),
        Err(e) => {
            error!("Assistant request failed: {}", e);
            Err(error_response(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}
