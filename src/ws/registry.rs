use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::project_store_client::ProjectStore;
use crate::error::CollabError;
use crate::models::{ConnectionId, RoomSnapshot, SendMessage};
use crate::ws::room::{Member, ProjectRoom};

pub type SharedRoom = Arc<Mutex<ProjectRoom>>;

/// What a caller gets back from a successful join
#[derive(Debug)]
pub struct JoinOutcome {
    pub connection_id: ConnectionId,
    pub project_id: String,
    pub snapshot: RoomSnapshot,
    /// Everything the room wants delivered to this connection, in order
    pub outbox: mpsc::Receiver<SendMessage>,
}

/// Tracks which connections are joined to which project room.
///
/// Lock order: `rooms` before a room's mutex. `connections` is only taken
/// on its own or while holding the `rooms` write lock.
pub struct SessionRegistry {
    rooms: RwLock<HashMap<String, SharedRoom>>,
    connections: RwLock<HashMap<ConnectionId, String>>,
    store: Arc<dyn ProjectStore>,
    heartbeat_timeout: Duration,
    outbox_capacity: usize,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ProjectStore>, heartbeat_timeout: Duration, outbox_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            store,
            heartbeat_timeout,
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Registers a new member of `project_id`'s room, creating the room from
    /// the project store's content if nobody is editing it yet.
    pub async fn join(&self, project_id: &str, user_id: &str) -> Result<JoinOutcome, CollabError> {
        let project = self.store
            .lookup(project_id, user_id)
            .await?
            .ok_or_else(|| CollabError::RoomUnavailable(project_id.to_string()))?;

        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.outbox_capacity);

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(project_id.to_string())
            .or_insert_with(|| {
                info!("Opening room for project {}", project_id);
                Arc::new(Mutex::new(ProjectRoom::new(project_id, project.content)))
            })
            .clone();

        let snapshot = {
            let mut room = room.lock().await;
            let snapshot = room.snapshot();
            room.add_member(Member::new(connection_id, user_id.to_string(), snapshot.sequence, tx));
            snapshot
        };
        self.connections.write().await.insert(connection_id, project_id.to_string());
        drop(rooms);

        info!("User {} joined project {} as connection {} at sequence {}", user_id, project_id, connection_id, snapshot.sequence);
        Ok(JoinOutcome {
            connection_id,
            project_id: project_id.to_string(),
            snapshot,
            outbox: rx,
        })
    }

    /// Removes a connection. Returns whether it was still registered; a
    /// repeated call is a no-op. The room is discarded with its last member.
    pub async fn leave(&self, connection_id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let project_id = match self.connections.write().await.remove(&connection_id) {
            Some(project_id) => project_id,
            None => {
                debug!("Leave for unknown connection {}", connection_id);
                return false;
            }
        };

        if let Some(room) = rooms.get(&project_id).cloned() {
            let mut guard = room.lock().await;
            guard.remove_member(connection_id);
            info!("Connection {} left project {} ({} remaining)", connection_id, project_id, guard.len());
            if guard.is_empty() {
                drop(guard);
                rooms.remove(&project_id);
                info!("Closed room for project {}", project_id);
            }
        }
        true
    }

    /// Refreshes the liveness of a connection.
    pub async fn heartbeat(&self, connection_id: ConnectionId) -> Result<(), CollabError> {
        let room = self.room_for(connection_id).await?;
        let mut room = room.lock().await;
        room.member_mut(connection_id)?.last_heartbeat = Instant::now();
        Ok(())
    }

    /// Records the highest sequence a member confirmed having applied.
    pub async fn ack(&self, connection_id: ConnectionId, sequence: u64) -> Result<u64, CollabError> {
        let room = self.room_for(connection_id).await?;
        let mut room = room.lock().await;
        let current = room.sequence();
        let member = room.member_mut(connection_id)?;
        member.last_heartbeat = Instant::now();
        member.last_seen_sequence = member.last_seen_sequence.max(sequence.min(current));
        Ok(member.last_seen_sequence)
    }

    /// Queues the room's current snapshot to the member and returns it.
    pub async fn resync(&self, connection_id: ConnectionId) -> Result<RoomSnapshot, CollabError> {
        let room = self.room_for(connection_id).await?;
        let mut room = room.lock().await;
        let (snapshot, _) = room.resync_member(connection_id)?;
        debug!("Resync of connection {} to sequence {}", connection_id, snapshot.sequence);
        Ok(snapshot)
    }

    /// Latest snapshot of a project's room, if anyone is editing it
    pub async fn snapshot(&self, project_id: &str) -> Option<RoomSnapshot> {
        let room = self.rooms.read().await.get(project_id).cloned()?;
        let room = room.lock().await;
        Some(room.snapshot())
    }

    /// Calls `leave` for every member silent for longer than the heartbeat timeout.
    pub async fn reap_idle(&self) -> Vec<ConnectionId> {
        let rooms: Vec<SharedRoom> = self.rooms.read().await.values().cloned().collect();
        let mut idle = Vec::new();
        for room in rooms {
            let room = room.lock().await;
            idle.extend(
                room.members()
                    .filter(|m| m.last_heartbeat.elapsed() > self.heartbeat_timeout)
                    .map(|m| m.connection_id),
            );
        }

        for connection_id in &idle {
            warn!("Connection {} missed its heartbeat, removing it", connection_id);
            self.leave(*connection_id).await;
        }
        idle
    }

    /// Runs `reap_idle` every half heartbeat timeout until the registry is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let period = (self.heartbeat_timeout / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let reaped = registry.reap_idle().await;
                if !reaped.is_empty() {
                    info!("Reaped {} idle connections", reaped.len());
                }
            }
        })
    }

    /// Number of open rooms and joined connections
    pub async fn stats(&self) -> (usize, usize) {
        let rooms = self.rooms.read().await.len();
        let connections = self.connections.read().await.len();
        (rooms, connections)
    }

    pub(crate) async fn room_for(&self, connection_id: ConnectionId) -> Result<SharedRoom, CollabError> {
        let project_id = self.connections
            .read()
            .await
            .get(&connection_id)
            .cloned()
            .ok_or(CollabError::StaleConnection(connection_id))?;
        self.rooms
            .read()
            .await
            .get(&project_id)
            .cloned()
            .ok_or(CollabError::StaleConnection(connection_id))
    }
}
