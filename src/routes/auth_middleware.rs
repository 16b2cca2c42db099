use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::services::auth_service::authenticate;
use crate::AppState;

pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (mut parts, body) = req.into_parts();

    let principal = match authenticate(&parts, &app_state.config) {
        Ok(principal) => principal,
        Err(e) => {
            error!("Authentication failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // Set the principal into request extensions for downstream handlers
    parts.extensions.insert(principal);

    Ok(next.run(Request::from_parts(parts, body)).await)
}
