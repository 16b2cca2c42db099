use serde::{Deserialize, Serialize};
use crate::models::{ConnectionId, EditEvent, ExecutionResult};

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JoinMessage {
    pub project_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AckMessage {
    pub sequence: u64,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteMessage {
    pub code: String,
    pub request_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CancelMessage {
    pub request_id: String,
}

/// Frames a client may send
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "join")]
    Join(JoinMessage),
    #[serde(rename = "edit")]
    Edit(EditMessage),
    #[serde(rename = "ack")]
    Ack(AckMessage),
    #[serde(rename = "resync")]
    Resync,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "execute")]
    Execute(ExecuteMessage),
    #[serde(rename = "cancel")]
    Cancel(CancelMessage),
    #[serde(rename = "leave")]
    Leave,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedMessage {
    pub connection_id: ConnectionId,
    pub project_id: String,
    pub sequence: u64,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditAcceptedMessage {
    pub sequence: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMessage {
    pub sequence: u64,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionQueuedMessage {
    pub request_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Frames the server sends
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "joined")]
    Joined(JoinedMessage),
    #[serde(rename = "editBroadcast")]
    EditBroadcast(EditEvent),
    #[serde(rename = "editAccepted")]
    EditAccepted(EditAcceptedMessage),
    #[serde(rename = "snapshot")]
    Snapshot(SnapshotMessage),
    #[serde(rename = "executionQueued")]
    ExecutionQueued(ExecutionQueuedMessage),
    #[serde(rename = "executionResult")]
    ExecutionResult(ExecutionResult),
    #[serde(rename = "pong")]
    Pong(PongMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl SendMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>, request_id: Option<String>) -> Self {
        SendMessage::Error(ErrorMessage {
            code: code.into(),
            message: message.into(),
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_client_frames() {
        let msg: ReceivedMessage = serde_json::from_value(json!({"type": "join", "projectId": "P1"})).unwrap();
        assert!(matches!(msg, ReceivedMessage::Join(JoinMessage { ref project_id }) if project_id == "P1"));

        let msg: ReceivedMessage = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert!(matches!(msg, ReceivedMessage::Ping));

        let msg: ReceivedMessage = serde_json::from_value(json!({"type": "execute", "code": "print(1)"})).unwrap();
        assert!(matches!(msg, ReceivedMessage::Execute(ExecuteMessage { request_id: None, .. })));
    }

    #[test]
    fn edit_broadcast_carries_sequence_and_content() {
        let event = EditEvent {
            project_id: "P1".to_string(),
            user_id: "u1".to_string(),
            sequence: 1,
            content: "print(1)".to_string(),
            sent_at: chrono::Utc::now(),
        };
        let value = serde_json::to_value(SendMessage::EditBroadcast(event)).unwrap();
        assert_eq!(value["type"], "editBroadcast");
        assert_eq!(value["sequence"], 1);
        assert_eq!(value["content"], "print(1)");
        assert_eq!(value["projectId"], "P1");
    }

    #[test]
    fn error_frame_omits_missing_request_id() {
        let value = serde_json::to_value(SendMessage::error("notJoined", "join first", None)).unwrap();
        assert_eq!(value, json!({"type": "error", "code": "notJoined", "message": "join first"}));
    }
}
