use std::sync::Arc;
use tracing::{error, info};

use crate::auth::auth::Principal;
use crate::models::{JoinMessage, JoinedMessage, SendMessage};
use crate::websocket::handler::{send_message, WsSender};
use crate::ws::registry::JoinOutcome;
use crate::AppState;

/// Handle JoinMessage. Registers the connection and sends the room snapshot
/// before anything from the room's outbox can reach the socket.
pub async fn handle_join_message(
    join_msg: &JoinMessage,
    app_state: &Arc<AppState>,
    principal: &Principal,
    sender: &WsSender,
) -> Option<JoinOutcome> {
    info!("Join message received for project {} from {}", join_msg.project_id, principal.user_id);

    let joined = match app_state.registry.join(&join_msg.project_id, &principal.user_id).await {
        Ok(joined) => joined,
        Err(e) => {
            error!("Join of project {} failed: {}", join_msg.project_id, e);
            send_message(sender, &SendMessage::error(e.code(), e.to_string(), None)).await;
            return None;
        }
    };

    let msg = SendMessage::Joined(JoinedMessage {
        connection_id: joined.connection_id,
        project_id: joined.project_id.clone(),
        sequence: joined.snapshot.sequence,
        content: joined.snapshot.content.clone(),
    });
    if !send_message(sender, &msg).await {
        error!("Failed to send Joined message for project {}", join_msg.project_id);
        app_state.registry.leave(joined.connection_id).await;
        return None;
    }
    Some(joined)
}
