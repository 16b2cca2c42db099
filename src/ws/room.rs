use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CollabError;
use crate::models::{ConnectionId, EditAcceptedMessage, EditEvent, RoomSnapshot, SendMessage, SnapshotMessage};

/// A connection joined to a project room
#[derive(Debug)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen_sequence: u64,
    pub last_heartbeat: Instant,
    outbox: mpsc::Sender<SendMessage>,
    lagging: bool,
}

impl Member {
    pub fn new(connection_id: ConnectionId, user_id: String, sequence: u64, outbox: mpsc::Sender<SendMessage>) -> Self {
        Self {
            connection_id,
            user_id,
            joined_at: Utc::now(),
            last_seen_sequence: sequence,
            last_heartbeat: Instant::now(),
            outbox,
            lagging: false,
        }
    }

    /// Non-blocking enqueue. A full outbox drops the message and marks the
    /// member lagging. The first message that fits afterwards is replaced by
    /// the room's `current` snapshot, so the member converges without a backlog.
    fn offer(&mut self, project_id: &str, msg: SendMessage, current: impl FnOnce() -> RoomSnapshot) -> Delivery {
        let msg = if self.lagging {
            let snapshot = current();
            SendMessage::Snapshot(SnapshotMessage {
                sequence: snapshot.sequence,
                content: snapshot.content,
            })
        } else {
            msg
        };
        match self.outbox.try_send(msg) {
            Ok(()) => {
                if self.lagging {
                    debug!("Connection {} caught up in room {} from a snapshot", self.connection_id, project_id);
                    self.lagging = false;
                }
                Delivery::Queued
            }
            Err(TrySendError::Full(_)) => {
                if !self.lagging {
                    warn!("Outbox of connection {} in room {} is full, skipping until it drains", self.connection_id, project_id);
                    self.lagging = true;
                }
                Delivery::Lagging
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Outbox of connection {} in room {} is closed", self.connection_id, project_id);
                Delivery::Closed
            }
        }
    }

    pub fn is_lagging(&self) -> bool {
        self.lagging
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Lagging,
    Closed,
}

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub queued: usize,
    pub lagging: usize,
    pub closed: usize,
}

/// Members, sequence counter and authoritative snapshot of one project.
///
/// Only ever mutated behind the room's mutex, which is the per-room
/// ordering point for edits.
#[derive(Debug)]
pub struct ProjectRoom {
    pub project_id: String,
    members: Vec<Member>,
    sequence: u64,
    content: String,
}

impl ProjectRoom {
    pub fn new(project_id: impl Into<String>, content: String) -> Self {
        Self {
            project_id: project_id.into(),
            members: Vec::new(),
            sequence: 0,
            content,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            sequence: self.sequence,
            content: self.content.clone(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// Adds a member. A second entry for the same connection replaces the first.
    pub fn add_member(&mut self, member: Member) {
        self.members.retain(|m| m.connection_id != member.connection_id);
        self.members.push(member);
    }

    pub fn remove_member(&mut self, connection_id: ConnectionId) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.connection_id == connection_id)?;
        Some(self.members.remove(idx))
    }

    pub fn member_mut(&mut self, connection_id: ConnectionId) -> Result<&mut Member, CollabError> {
        self.members
            .iter_mut()
            .find(|m| m.connection_id == connection_id)
            .ok_or(CollabError::StaleConnection(connection_id))
    }

    /// Assigns the next sequence to `content` and makes it the room's
    /// snapshot. Fails if `author` is not a member.
    pub fn accept_edit(&mut self, author: ConnectionId, content: String) -> Result<EditEvent, CollabError> {
        let next = self.sequence + 1;
        let member = self.member_mut(author)?;
        member.last_heartbeat = Instant::now();
        member.last_seen_sequence = next;
        let user_id = member.user_id.clone();

        self.sequence = next;
        self.content = content.clone();

        Ok(EditEvent {
            project_id: self.project_id.clone(),
            user_id,
            sequence: next,
            content,
            sent_at: Utc::now(),
        })
    }

    /// Hands `event` to every member except its author, who only gets the
    /// sequence it was assigned. Never waits on a slow member.
    pub fn fan_out(&mut self, author: ConnectionId, event: &EditEvent) -> FanOut {
        let mut report = FanOut::default();
        for member in self.members.iter_mut() {
            let msg = if member.connection_id == author {
                SendMessage::EditAccepted(EditAcceptedMessage { sequence: event.sequence })
            } else {
                SendMessage::EditBroadcast(event.clone())
            };
            let current = || RoomSnapshot {
                sequence: event.sequence,
                content: event.content.clone(),
            };
            match member.offer(&self.project_id, msg, current) {
                Delivery::Queued => report.queued += 1,
                Delivery::Lagging => report.lagging += 1,
                Delivery::Closed => report.closed += 1,
            }
        }
        report
    }

    /// Queues the current snapshot for one member, behind anything already
    /// queued for it.
    pub fn resync_member(&mut self, connection_id: ConnectionId) -> Result<(RoomSnapshot, Delivery), CollabError> {
        let snapshot = self.snapshot();
        let project_id = self.project_id.clone();
        let member = self.member_mut(connection_id)?;
        member.last_heartbeat = Instant::now();
        let msg = SendMessage::Snapshot(SnapshotMessage {
            sequence: snapshot.sequence,
            content: snapshot.content.clone(),
        });
        let delivery = member.offer(&project_id, msg, || snapshot.clone());
        Ok((snapshot, delivery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn member(user: &str, capacity: usize) -> (Member, mpsc::Receiver<SendMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Member::new(Uuid::new_v4(), user.to_string(), 0, tx), rx)
    }

    fn broadcast_sequence(msg: SendMessage) -> u64 {
        match msg {
            SendMessage::EditBroadcast(event) => event.sequence,
            other => panic!("expected editBroadcast, got {:?}", other),
        }
    }

    #[test]
    fn edits_get_consecutive_sequences() {
        let mut room = ProjectRoom::new("P1", String::new());
        let (a, _rx) = member("a", 4);
        let a_id = a.connection_id;
        room.add_member(a);

        assert_eq!(room.accept_edit(a_id, "x".to_string()).unwrap().sequence, 1);
        assert_eq!(room.accept_edit(a_id, "xy".to_string()).unwrap().sequence, 2);
        assert_eq!(room.snapshot(), RoomSnapshot { sequence: 2, content: "xy".to_string() });
    }

    #[test]
    fn stale_author_is_rejected_without_bumping_sequence() {
        let mut room = ProjectRoom::new("P1", "seed".to_string());
        let ghost = Uuid::new_v4();
        assert!(matches!(room.accept_edit(ghost, "x".to_string()), Err(CollabError::StaleConnection(id)) if id == ghost));
        assert_eq!(room.sequence(), 0);
        assert_eq!(room.snapshot().content, "seed");
    }

    #[test]
    fn author_gets_acceptance_not_echo() {
        let mut room = ProjectRoom::new("P1", String::new());
        let (a, mut a_rx) = member("a", 4);
        let (b, mut b_rx) = member("b", 4);
        let a_id = a.connection_id;
        room.add_member(a);
        room.add_member(b);

        let event = room.accept_edit(a_id, "print(1)".to_string()).unwrap();
        let report = room.fan_out(a_id, &event);
        assert_eq!(report, FanOut { queued: 2, lagging: 0, closed: 0 });

        assert_eq!(a_rx.try_recv().unwrap(), SendMessage::EditAccepted(EditAcceptedMessage { sequence: 1 }));
        assert_eq!(b_rx.try_recv().unwrap(), SendMessage::EditBroadcast(event));
    }

    #[test]
    fn lagging_member_converges_on_latest_content() {
        let mut room = ProjectRoom::new("P1", String::new());
        let (a, _a_rx) = member("a", 16);
        let (slow, mut slow_rx) = member("slow", 1);
        let (a_id, slow_id) = (a.connection_id, slow.connection_id);
        room.add_member(a);
        room.add_member(slow);

        for content in ["1", "12", "123"] {
            let event = room.accept_edit(a_id, content.to_string()).unwrap();
            room.fan_out(a_id, &event);
        }
        assert!(room.member_mut(slow_id).unwrap().is_lagging());

        assert_eq!(broadcast_sequence(slow_rx.try_recv().unwrap()), 1);
        let event = room.accept_edit(a_id, "1234".to_string()).unwrap();
        let report = room.fan_out(a_id, &event);
        assert_eq!(report.lagging, 0);
        assert!(!room.member_mut(slow_id).unwrap().is_lagging());

        assert_eq!(
            slow_rx.try_recv().unwrap(),
            SendMessage::Snapshot(SnapshotMessage { sequence: 4, content: "1234".to_string() })
        );

        // back to normal broadcasts once caught up
        let event = room.accept_edit(a_id, "12345".to_string()).unwrap();
        room.fan_out(a_id, &event);
        assert_eq!(broadcast_sequence(slow_rx.try_recv().unwrap()), 5);
    }

    #[test]
    fn closed_outbox_does_not_block_others() {
        let mut room = ProjectRoom::new("P1", String::new());
        let (a, _a_rx) = member("a", 4);
        let (gone, gone_rx) = member("gone", 4);
        let (b, mut b_rx) = member("b", 4);
        let a_id = a.connection_id;
        room.add_member(a);
        room.add_member(gone);
        room.add_member(b);
        drop(gone_rx);

        let event = room.accept_edit(a_id, "x".to_string()).unwrap();
        let report = room.fan_out(a_id, &event);
        assert_eq!(report.closed, 1);
        assert_eq!(broadcast_sequence(b_rx.try_recv().unwrap()), 1);
    }

    #[test]
    fn resync_queues_snapshot_for_one_member() {
        let mut room = ProjectRoom::new("P1", "seed".to_string());
        let (a, mut a_rx) = member("a", 4);
        let a_id = a.connection_id;
        room.add_member(a);

        let (snapshot, delivery) = room.resync_member(a_id).unwrap();
        assert_eq!(delivery, Delivery::Queued);
        assert_eq!(snapshot.sequence, 0);
        assert_eq!(
            a_rx.try_recv().unwrap(),
            SendMessage::Snapshot(SnapshotMessage { sequence: 0, content: "seed".to_string() })
        );
    }
}
