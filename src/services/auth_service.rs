use axum::http::{self, request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::{info, warn};

use crate::auth::auth::Principal;
use crate::config::Config;

pub const ANONYMOUS_USER: &str = "anonymous";

// Get the auth token from a request
pub fn get_auth_token(parts: &Parts) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = parts.headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = parts.headers.get(http::header::COOKIE) {
        let cookie_str = cookie_header.to_str().map_err(|_| "Invalid Cookie header".to_string())?;
        for c in cookie::Cookie::split_parse(cookie_str).flatten() {
            if c.name() == "auth_token" {
                return Ok(c.value().to_string());
            }
        }
    }

    // 3. Browsers cannot set headers on WebSocket requests, so accept ?token=
    if let Some(query) = parts.uri.query() {
        for pair in query.split('&') {
            if let Some(token) = pair.strip_prefix("token=") {
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
        }
    }

    Err("Missing Authorization header, auth_token cookie or token parameter".to_string())
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Resolve who is calling. Without a configured secret, development mode
/// lets everyone in as the anonymous user.
pub fn authenticate(parts: &Parts, config: &Config) -> Result<Principal, String> {
    let Some(secret) = &config.auth_jwt_secret else {
        if config.is_development() {
            warn!("No JWT secret configured, admitting request as '{}'", ANONYMOUS_USER);
            return Ok(Principal {
                user_id: ANONYMOUS_USER.to_string(),
                roles: Vec::new(),
            });
        }
        return Err("No JWT secret configured!".to_string());
    };

    let token = get_auth_token(parts)?;
    let token_data = validate_jwt(&token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;

    let user_id = token_data.claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "Can't extract a UID from the JWT token".to_string())?
        .to_string();

    let roles = match token_data.claims.get("roles").and_then(|v| v.as_array()) {
        Some(roles_array) => roles_array.iter().filter_map(|r| r.as_str().map(|s| s.to_string())).collect(),
        None => Vec::new(),
    };

    info!("JWT token validated successfully for user: {}", user_id);
    Ok(Principal { user_id, roles })
}
