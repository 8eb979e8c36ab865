//! Per-event orchestration between sessions, the stores and the room hub.
//!
//! Every inbound event resolves to `ChatResult<()>`. On `Err` the caller alone
//! receives an `error` event and nothing is broadcast; other connections never
//! observe a failed operation.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::{EventReceiver, RoomHub};
use crate::chat::{ChatMessage, MessageType, NewMessage, RoomType};
use crate::config::Config;
use crate::entity::{Identity, Role};
use crate::error::{ChatError, ChatResult, PermissionDenied};
use crate::permission;
use crate::protocol::{
    ClientEvent, EscalateRoom, JoinRoom, MarkAsRead, SendMessage, ServerEvent, StopTyping, Typing,
};
use crate::session::ConnectionSession;
use crate::store::{MessageStore, RoomRegistry, Store};

const DEFAULT_ESCALATION_REASON: &str = "No reason provided";

pub struct ChatCoordinator {
    messages: Arc<dyn MessageStore>,
    rooms: Arc<dyn RoomRegistry>,
    hub: RoomHub,
    config: Config,
}

impl ChatCoordinator {
    pub fn new(messages: Arc<dyn MessageStore>, rooms: Arc<dyn RoomRegistry>, config: Config) -> Self {
        Self {
            messages,
            rooms,
            hub: RoomHub::new(),
            config,
        }
    }

    /// Backs both seams with the same SQLite store.
    pub fn with_store(store: Store, config: Config) -> Self {
        let store = Arc::new(store);
        Self::new(store.clone(), store, config)
    }

    pub fn messages(&self) -> &Arc<dyn MessageStore> {
        &self.messages
    }

    pub fn rooms(&self) -> &Arc<dyn RoomRegistry> {
        &self.rooms
    }

    pub fn hub(&self) -> &RoomHub {
        &self.hub
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens a session and its outbound event channel.
    pub async fn connect(&self) -> (ConnectionSession, EventReceiver) {
        let session = ConnectionSession::new();
        let rx = self.hub.register(session.id()).await;
        debug!(connection_id = %session.id(), "connection opened");
        (session, rx)
    }

    /// Processes one inbound event to completion. Errors are reported to the
    /// originating connection and returned.
    pub async fn handle(&self, session: &mut ConnectionSession, event: ClientEvent) -> ChatResult<()> {
        let name = event.name();
        let result = match event {
            _ if session.is_disconnected() => Err(PermissionDenied::NotJoined.into()),
            ClientEvent::JoinRoom(req) => self.join(session, req).await,
            ClientEvent::SendMessage(req) => self.send(session, req).await,
            ClientEvent::Typing(req) => self.typing(session, req).await,
            ClientEvent::StopTyping(req) => self.stop_typing(session, req).await,
            ClientEvent::MarkAsRead(req) => self.mark_read(session, req).await,
            ClientEvent::EscalateRoom(req) => self.escalate(session, req).await,
        };
        if let Err(err) = &result {
            warn!(connection_id = %session.id(), event = name, code = err.code(), "event rejected: {}", err);
            self.reject(session, err).await;
        }
        result
    }

    /// Sends a scoped `error` event to the session's connection.
    pub async fn reject(&self, session: &ConnectionSession, err: &ChatError) {
        self.hub.send_to(session.id(), ServerEvent::error(err)).await;
    }

    /// Tears the session down. Remaining room subscribers get `user_left`.
    pub async fn disconnect(&self, session: &mut ConnectionSession) {
        let connection_id = session.id();
        if let Some((identity, room_id)) = session.disconnect() {
            let event = ServerEvent::UserLeft {
                login_id: identity.login_id.clone(),
                user_name: identity.name.clone(),
            };
            self.hub.publish(&room_id, &event, Some(connection_id)).await;
            info!("{} disconnected from {}", identity, room_id);
        }
        self.hub.unregister(connection_id).await;
    }

    async fn bounded<T>(&self, fut: impl Future<Output = ChatResult<T>>) -> ChatResult<T> {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout(self.config.store_timeout.as_millis() as u64)),
        }
    }

    async fn join(&self, session: &mut ConnectionSession, req: JoinRoom) -> ChatResult<()> {
        let room_id = req.room_id.trim().to_string();
        let login_id = req.login_id.trim().to_string();
        let role = match req.role {
            Some(role) if role != Role::System && !room_id.is_empty() && !login_id.is_empty() => role,
            _ => {
                return Err(ChatError::validation(
                    "Missing required fields: room_id, login_id, role",
                ))
            }
        };
        let user_name = req
            .user_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| login_id.clone());
        let identity = Identity::new(login_id, user_name, role);

        let room = self
            .bounded(
                self.rooms
                    .get_or_create(&room_id, RoomType::Generic, &[identity.participant()]),
            )
            .await?;
        permission::can_join(&room, &identity.login_id, identity.role)?;

        let room = self
            .bounded(self.rooms.add_participant(&room_id, &identity.participant()))
            .await?;
        let history = self
            .bounded(self.messages.list_by_room(&room_id, self.config.history_limit, None))
            .await?;
        let total_count = self.bounded(self.messages.count_by_room(&room_id)).await?;

        self.hub
            .subscribe(session.id(), &identity.login_id, &room_id)
            .await;
        if let Some(previous) = session.join(identity.clone(), room_id.clone()) {
            if previous != room_id {
                debug!(connection_id = %session.id(), from = %previous, to = %room_id, "session moved rooms");
            }
        }

        self.hub
            .send_to(
                session.id(),
                ServerEvent::RoomJoined {
                    room_id: room.room_id.clone(),
                    room_type: room.room_type,
                    participants: room.participants.clone(),
                    escalation_level: room.escalation_level,
                    message: "Successfully joined room".to_string(),
                },
            )
            .await;
        self.hub
            .send_to(
                session.id(),
                ServerEvent::MessageHistory {
                    messages: history,
                    total_count,
                },
            )
            .await;

        let notice = NewMessage::system(
            room_id.as_str(),
            format!("{} ({}) joined the conversation", identity.name, identity.role),
        );
        // The caller is already joined at this point.
        match self.bounded(self.messages.append(notice)).await {
            Ok(notice) => {
                self.hub
                    .publish(
                        &room_id,
                        &ServerEvent::UserJoined {
                            login_id: identity.login_id.clone(),
                            user_name: identity.name.clone(),
                            role: identity.role,
                            message: notice,
                        },
                        None,
                    )
                    .await;
            }
            Err(err) => {
                warn!(room_id = %room_id, login_id = %identity.login_id, "join notice not stored: {}", err);
            }
        }

        info!("{} joined room {} as {}", identity, room_id, identity.role);
        Ok(())
    }

    async fn send(&self, session: &mut ConnectionSession, req: SendMessage) -> ChatResult<()> {
        permission::can_send(session)?;
        let (identity, room_id) = joined_in(session, req.room_id.as_deref())?;

        let message_type = req.message_type.unwrap_or(MessageType::Text);
        if matches!(message_type, MessageType::System | MessageType::Escalation) {
            return Err(ChatError::validation(format!(
                "message_type {} is reserved",
                message_type.as_str()
            )));
        }
        let mut draft = NewMessage {
            room_id: room_id.clone(),
            sender: identity.clone(),
            body: req.message,
            message_type,
            file_url: req.file_url,
        };
        draft.validate()?;

        let message = self.bounded(self.messages.append(draft)).await?;
        self.record_last_message(&message).await;

        let event = ServerEvent::NewMessage(message);
        let delivered = self.hub.publish(&room_id, &event, None).await;
        debug!(room_id = %room_id, sender = %identity.login_id, delivered, "message broadcast");

        if let Some(booking_id) = req.booking_id.filter(|_| self.config.booking_dual_delivery) {
            self.deliver_to_counterparts(&identity, &room_id, &booking_id, &event)
                .await;
        }
        Ok(())
    }

    async fn record_last_message(&self, message: &ChatMessage) {
        // The message itself is stored; a stale preview is not worth failing the send.
        if let Err(err) = self
            .bounded(self.rooms.touch_last_message(
                &message.room_id,
                &message.preview(),
                message.created_at,
            ))
            .await
        {
            warn!(room_id = %message.room_id, "failed to update last message: {}", err);
        }
    }

    async fn deliver_to_counterparts(
        &self,
        sender: &Identity,
        room_id: &str,
        booking_id: &str,
        event: &ServerEvent,
    ) {
        let room = match self.bounded(self.rooms.get(room_id)).await {
            Ok(Some(room)) => room,
            Ok(None) => return,
            Err(err) => {
                warn!(room_id, booking_id, "booking delivery skipped: {}", err);
                return;
            }
        };
        for participant in room.counterparts(&sender.login_id) {
            let delivered = self
                .hub
                .deliver_outside_room(&participant.login_id, room_id, event)
                .await;
            if delivered > 0 {
                debug!(room_id, booking_id, to = %participant.login_id, delivered, "booking delivery");
            }
        }
    }

    async fn typing(&self, session: &mut ConnectionSession, req: Typing) -> ChatResult<()> {
        if req.typing == Some(false) {
            return self
                .stop_typing(session, StopTyping { room_id: req.room_id })
                .await;
        }
        let (identity, room_id) = joined_in(session, req.room_id.as_deref())?;
        let event = ServerEvent::UserTyping {
            login_id: identity.login_id,
            user_name: identity.name,
            role: identity.role,
        };
        self.hub.publish(&room_id, &event, Some(session.id())).await;
        Ok(())
    }

    async fn stop_typing(&self, session: &mut ConnectionSession, req: StopTyping) -> ChatResult<()> {
        let (identity, room_id) = joined_in(session, req.room_id.as_deref())?;
        let event = ServerEvent::UserStopTyping {
            login_id: identity.login_id,
            user_name: identity.name,
        };
        self.hub.publish(&room_id, &event, Some(session.id())).await;
        Ok(())
    }

    async fn mark_read(&self, session: &mut ConnectionSession, req: MarkAsRead) -> ChatResult<()> {
        let (identity, room_id) = joined_in(session, req.room_id.as_deref())?;
        let message_ids: Vec<String> = req
            .message_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if message_ids.is_empty() {
            return Err(ChatError::validation("message_ids must not be empty"));
        }

        let read_at = self
            .bounded(
                self.messages
                    .mark_read(&message_ids, &identity.login_id, &identity.name),
            )
            .await?;
        let event = ServerEvent::MessagesRead {
            room_id: room_id.clone(),
            message_ids,
            login_id: identity.login_id,
            user_name: identity.name,
            read_at,
        };
        self.hub.publish(&room_id, &event, None).await;
        Ok(())
    }

    async fn escalate(&self, session: &mut ConnectionSession, req: EscalateRoom) -> ChatResult<()> {
        permission::can_escalate(session)?;
        let (identity, room_id) = joined_in(session, req.room_id.as_deref())?;
        let reason = req
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ESCALATION_REASON.to_string());

        let outcome = self
            .bounded(self.rooms.escalate(&room_id, &identity, &reason))
            .await?;

        if outcome.already_max() {
            self.hub
                .send_to(
                    session.id(),
                    ServerEvent::RoomEscalated {
                        room: Box::new(outcome.room),
                        system_message: None,
                        escalation_level: outcome.new_level,
                        already_max: true,
                    },
                )
                .await;
            info!(room_id = %room_id, "escalation already at {}", outcome.new_level.target());
            return Ok(());
        }

        let event = ServerEvent::RoomEscalated {
            room: Box::new(outcome.room),
            system_message: outcome.notice,
            escalation_level: outcome.new_level,
            already_max: false,
        };
        self.hub.publish(&room_id, &event, None).await;
        info!(
            room_id = %room_id,
            from = outcome.previous_level.value(),
            to = outcome.new_level.value(),
            "room escalated by {}",
            identity
        );
        Ok(())
    }
}

/// The session's identity and room, provided `requested` (if any) names the
/// room the session is actually in.
fn joined_in(session: &ConnectionSession, requested: Option<&str>) -> ChatResult<(Identity, String)> {
    let (Some(identity), Some(current)) = (session.identity(), session.current_room()) else {
        return Err(PermissionDenied::NotJoined.into());
    };
    match requested.map(str::trim).filter(|r| !r.is_empty()) {
        Some(requested) if requested != current => Err(PermissionDenied::NotJoined.into()),
        _ => Ok((identity.clone(), current.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[test]
    fn test_joined_in_requires_join() {
        let session = ConnectionSession::new();
        let err = joined_in(&session, None).unwrap_err();
        assert_eq!(err.code(), "not_joined");
    }

    #[test]
    fn test_joined_in_checks_requested_room() {
        let mut session = ConnectionSession::new();
        session.join(Identity::new("U1", "Alice", Role::Tenant), "R1".into());

        let (identity, room_id) = joined_in(&session, Some("R1")).unwrap();
        assert_eq!(identity.login_id, "U1");
        assert_eq!(room_id, "R1");
        assert!(joined_in(&session, Some("  ")).is_ok());
        assert!(joined_in(&session, Some("R2")).is_err());
        assert!(matches!(session.state(), SessionState::Joined { .. }));
    }
}
