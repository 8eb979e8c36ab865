use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::protocol::ServerEvent;
use crate::session::ConnectionId;

/// Events queued per connection before further events are dropped.
pub const OUTBOUND_BUFFER: usize = 256;

pub type EventSender = mpsc::Sender<ServerEvent>;
pub type EventReceiver = mpsc::Receiver<ServerEvent>;

struct Subscriber {
    tx: EventSender,
    login_id: Option<String>,
    room_id: Option<String>,
}

impl Subscriber {
    /// Queues without waiting. A client that stops reading loses events
    /// instead of stalling the room.
    fn offer(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(%connection_id, event = event.name(), "outbound queue full, event dropped");
                false
            }
            // A closed receiver means the connection is tearing down.
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Subscriber>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl HubState {
    fn leave_room(&mut self, connection_id: ConnectionId, room_id: &str) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }
}

/// Process-local fan-out from rooms to live connections.
///
/// A connection is subscribed to at most one room. Fanning out across
/// processes needs an external pub/sub and is not handled here.
pub struct RoomHub {
    state: RwLock<HubState>,
    buffer: usize,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::with_buffer(OUTBOUND_BUFFER)
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            buffer: buffer.max(1),
        }
    }

    /// Creates the outbound channel for a new connection.
    pub async fn register(&self, connection_id: ConnectionId) -> EventReceiver {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.state.write().await.connections.insert(
            connection_id,
            Subscriber {
                tx,
                login_id: None,
                room_id: None,
            },
        );
        rx
    }

    /// Subscribes the connection to `room_id`, dropping any previous room so
    /// stale broadcasts never reach it.
    pub async fn subscribe(&self, connection_id: ConnectionId, login_id: &str, room_id: &str) {
        let mut state = self.state.write().await;
        let previous = match state.connections.get_mut(&connection_id) {
            Some(sub) => {
                sub.login_id = Some(login_id.to_string());
                sub.room_id.replace(room_id.to_string())
            }
            None => return,
        };
        if let Some(previous) = previous {
            if previous != room_id {
                state.leave_room(connection_id, &previous);
            }
        }
        state
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id);
        debug!(%connection_id, login_id, room_id, "connection subscribed");
    }

    pub async fn unregister(&self, connection_id: ConnectionId) {
        let mut state = self.state.write().await;
        if let Some(sub) = state.connections.remove(&connection_id) {
            if let Some(room_id) = sub.room_id {
                state.leave_room(connection_id, &room_id);
            }
        }
    }

    /// Sends to one connection. `false` if it is gone.
    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let state = self.state.read().await;
        match state.connections.get(&connection_id) {
            Some(sub) => sub.offer(connection_id, event),
            None => false,
        }
    }

    /// Sends to every subscriber of the room except `exclude`. Returns how
    /// many connections accepted the event.
    pub async fn publish(
        &self,
        room_id: &str,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room_id) else {
            return 0;
        };
        let mut delivered = 0;
        for id in members {
            if Some(*id) == exclude {
                continue;
            }
            if let Some(sub) = state.connections.get(id) {
                if sub.offer(*id, event.clone()) {
                    delivered += 1;
                }
            }
        }
        trace!(room_id, event = event.name(), delivered, "room broadcast");
        delivered
    }

    /// Sends to the user's live connections that are not subscribed to
    /// `room_id` (they would already get the room broadcast).
    pub async fn deliver_outside_room(
        &self,
        login_id: &str,
        room_id: &str,
        event: &ServerEvent,
    ) -> usize {
        let state = self.state.read().await;
        state
            .connections
            .iter()
            .filter(|(_, sub)| sub.login_id.as_deref() == Some(login_id))
            .filter(|(_, sub)| sub.room_id.as_deref() != Some(room_id))
            .filter(|(id, sub)| sub.offer(**id, event.clone()))
            .count()
    }

    pub async fn room_size(&self, room_id: &str) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(room_id)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}
