use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Free-text question for the assistant
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct AssistantRequest {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct AssistantResponse {
    pub response: String,
    #[serde(rename = "type")]
    pub kind: String,
}
