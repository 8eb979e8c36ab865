use crate::entity::Identity;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Lifecycle of one live connection.
///
/// `Unauthenticated -> Joined(room) -> Disconnected`. A second join replaces
/// the room pointer; `Disconnected` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Joined { identity: Identity, room_id: String },
    Disconnected,
}

/// Per-connection state. Owned by whoever drives the connection and never
/// persisted.
#[derive(Debug)]
pub struct ConnectionSession {
    connection_id: ConnectionId,
    state: SessionState,
}

impl ConnectionSession {
    pub fn new() -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            state: SessionState::Unauthenticated,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Joined { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn current_room(&self) -> Option<&str> {
        match &self.state {
            SessionState::Joined { room_id, .. } => Some(room_id),
            _ => None,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.state == SessionState::Disconnected
    }

    /// Last join wins. Returns the room the session was previously in.
    pub fn join(&mut self, identity: Identity, room_id: String) -> Option<String> {
        let previous = std::mem::replace(
            &mut self.state,
            SessionState::Joined { identity, room_id },
        );
        match previous {
            SessionState::Joined { room_id, .. } => Some(room_id),
            _ => None,
        }
    }

    /// Moves to the terminal state, returning who was in which room.
    pub fn disconnect(&mut self) -> Option<(Identity, String)> {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Joined { identity, room_id } => Some((identity, room_id)),
            _ => None,
        }
    }
}

impl Default for ConnectionSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Role;

    #[test]
    fn test_lifecycle() {
        let mut session = ConnectionSession::new();
        assert_eq!(session.state(), &SessionState::Unauthenticated);
        assert!(session.current_room().is_none());

        let alice = Identity::new("U1", "Alice", Role::WebsiteUser);
        assert_eq!(session.join(alice.clone(), "R1".into()), None);
        assert_eq!(session.current_room(), Some("R1"));

        assert_eq!(session.join(alice.clone(), "R2".into()), Some("R1".into()));
        assert_eq!(session.current_room(), Some("R2"));

        assert_eq!(session.disconnect(), Some((alice, "R2".into())));
        assert!(session.is_disconnected());
        assert_eq!(session.disconnect(), None);
    }

    #[test]
    fn test_disconnect_without_join() {
        let mut session = ConnectionSession::new();
        assert_eq!(session.disconnect(), None);
        assert!(session.is_disconnected());
    }
}
