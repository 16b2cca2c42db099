use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CollabError;
use crate::models::ConnectionId;
use crate::ws::registry::SessionRegistry;

/// Assigns sequence numbers to edits and fans them out to the rest of the room.
#[derive(Clone)]
pub struct BroadcastRelay {
    registry: Arc<SessionRegistry>,
}

impl BroadcastRelay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Publishes `content` as the room's new snapshot and returns its
    /// sequence. Edits to one room are serialized on the room mutex, which is
    /// held only while enqueueing, never while sockets write.
    pub async fn publish_edit(&self, connection_id: ConnectionId, content: String) -> Result<u64, CollabError> {
        let room = self.registry.room_for(connection_id).await?;
        let mut room = room.lock().await;
        let event = room.accept_edit(connection_id, content)?;
        let report = room.fan_out(connection_id, &event);

        if report.lagging > 0 || report.closed > 0 {
            warn!(
                "Edit {} in project {} reached {} members ({} lagging, {} closed)",
                event.sequence, event.project_id, report.queued, report.lagging, report.closed
            );
        } else {
            debug!("Edit {} in project {} queued for {} members", event.sequence, event.project_id, report.queued);
        }
        Ok(event.sequence)
    }
}
