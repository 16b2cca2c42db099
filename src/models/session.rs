use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifies one live transport connection
pub type ConnectionId = Uuid;

/// One accepted edit of a project room.
///
/// `content` is the whole buffer as of `sequence`; events are never
/// mutated after the relay assigns their sequence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditEvent {
    pub project_id: String,
    pub user_id: String,
    pub sequence: u64,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Authoritative state of a room at a given sequence
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub sequence: u64,
    pub content: String,
}
