use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response body for any failed HTTP call
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}
