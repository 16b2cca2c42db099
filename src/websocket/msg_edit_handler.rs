use tracing::debug;

use crate::error::CollabError;
use crate::models::{AckMessage, ConnectionId, EditMessage};
use crate::ws::registry::SessionRegistry;
use crate::ws::relay::BroadcastRelay;

/// Handle EditMessage - Sequence and broadcast to the rest of the room
pub async fn handle_edit_message(
    edit_msg: EditMessage,
    connection_id: ConnectionId,
    relay: &BroadcastRelay,
) -> Result<(), CollabError> {
    let sequence = relay.publish_edit(connection_id, edit_msg.content).await?;
    debug!("Edit from connection {} accepted as {}", connection_id, sequence);
    Ok(())
}

/// Handle AckMessage
pub async fn handle_ack_message(
    ack_msg: &AckMessage,
    connection_id: ConnectionId,
    registry: &SessionRegistry,
) -> Result<(), CollabError> {
    let seen = registry.ack(connection_id, ack_msg.sequence).await?;
    debug!("Connection {} has applied up to {}", connection_id, seen);
    Ok(())
}

/// Handle resync - the snapshot travels through the outbox to keep ordering
pub async fn handle_resync_message(connection_id: ConnectionId, registry: &SessionRegistry) -> Result<(), CollabError> {
    registry.resync(connection_id).await.map(|_| ())
}
