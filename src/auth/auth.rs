use axum::{http::StatusCode, Json};
use crate::error::error_response;
use crate::models::ErrorResponse;

const ADMIN_ROLE: &str = "admin";

/// The authenticated caller, placed in request extensions by the auth middleware
#[derive(Clone, Debug, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub roles: Vec<String>,
}

pub fn is_admin(principal: &Principal) -> bool {
    principal.roles.iter().any(|r| r == ADMIN_ROLE)
}

pub fn ensure_admin(principal: &Principal) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_admin(principal) {
        return Ok(());
    }
    Err(error_response(StatusCode::FORBIDDEN, format!("User '{}' is not an administrator", principal.user_id)))
}
