//! Real-time wire protocol.
//!
//! Frames are JSON text messages, adjacently tagged:
//! `{"event": "join_room", "data": {...}}`. Inbound payloads reject unknown
//! fields; the older field spellings (`user_id`, `user_role`, `name`,
//! `to_login_id`) are accepted as aliases of the canonical names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ChatRoom, EscalationLevel, MessageType, RoomType};
use crate::entity::{Participant, Role};
use crate::error::{ChatError, ChatResult};

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom(JoinRoom),
    SendMessage(SendMessage),
    Typing(Typing),
    StopTyping(StopTyping),
    MarkAsRead(MarkAsRead),
    EscalateRoom(EscalateRoom),
}

impl ClientEvent {
    pub fn parse(text: &str) -> ChatResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| ChatError::validation(format!("Invalid message format: {e}")))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => "join_room",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stop_typing",
            ClientEvent::MarkAsRead(_) => "mark_as_read",
            ClientEvent::EscalateRoom(_) => "escalate_room",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoom {
    #[serde(default)]
    pub room_id: String,
    #[serde(default, alias = "user_id")]
    pub login_id: String,
    #[serde(default, alias = "user_role")]
    pub role: Option<Role>,
    #[serde(default, alias = "name")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessage {
    #[serde(default, alias = "to_login_id")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub booking_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Typing {
    #[serde(default, alias = "to_login_id")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub typing: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopTyping {
    #[serde(default, alias = "to_login_id")]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkAsRead {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalateRoom {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomJoined {
        room_id: String,
        room_type: RoomType,
        participants: Vec<Participant>,
        escalation_level: EscalationLevel,
        message: String,
    },
    MessageHistory {
        messages: Vec<ChatMessage>,
        total_count: i64,
    },
    UserJoined {
        login_id: String,
        user_name: String,
        role: Role,
        message: ChatMessage,
    },
    NewMessage(ChatMessage),
    UserTyping {
        login_id: String,
        user_name: String,
        role: Role,
    },
    UserStopTyping {
        login_id: String,
        user_name: String,
    },
    MessagesRead {
        room_id: String,
        message_ids: Vec<String>,
        login_id: String,
        user_name: String,
        read_at: DateTime<Utc>,
    },
    RoomEscalated {
        room: Box<ChatRoom>,
        system_message: Option<ChatMessage>,
        escalation_level: EscalationLevel,
        already_max: bool,
    },
    UserLeft {
        login_id: String,
        user_name: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &ChatError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RoomJoined { .. } => "room_joined",
            ServerEvent::MessageHistory { .. } => "message_history",
            ServerEvent::UserJoined { .. } => "user_joined",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStopTyping { .. } => "user_stop_typing",
            ServerEvent::MessagesRead { .. } => "messages_read",
            ServerEvent::RoomEscalated { .. } => "room_escalated",
            ServerEvent::UserLeft { .. } => "user_left",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_room_canonical() {
        let event = ClientEvent::parse(
            r#"{"event":"join_room","data":{"room_id":"R1","login_id":"U1","role":"website_user","user_name":"Alice"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom(JoinRoom {
                room_id: "R1".into(),
                login_id: "U1".into(),
                role: Some(Role::WebsiteUser),
                user_name: Some("Alice".into()),
            })
        );
    }

    #[test]
    fn test_parse_join_room_aliases() {
        let event = ClientEvent::parse(
            r#"{"event":"join_room","data":{"room_id":"R1","user_id":"P1","user_role":"owner","name":"Priya"}}"#,
        )
        .unwrap();
        let ClientEvent::JoinRoom(join) = event else {
            panic!("expected join_room");
        };
        assert_eq!(join.login_id, "P1");
        assert_eq!(join.role, Some(Role::PropertyOwner));
        assert_eq!(join.user_name.as_deref(), Some("Priya"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = ClientEvent::parse(
            r#"{"event":"send_message","data":{"message":"hi","sender_role":"superadmin"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let err = ClientEvent::parse(r#"{"event":"delete_everything","data":{}}"#).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_send_message_to_login_id_alias() {
        let event = ClientEvent::parse(
            r#"{"event":"send_message","data":{"to_login_id":"R1","message":"Hi","booking_id":"B7"}}"#,
        )
        .unwrap();
        let ClientEvent::SendMessage(send) = event else {
            panic!("expected send_message");
        };
        assert_eq!(send.room_id.as_deref(), Some("R1"));
        assert_eq!(send.booking_id.as_deref(), Some("B7"));
        assert_eq!(send.message_type, None);
    }

    #[test]
    fn test_server_event_shape() {
        let event = ServerEvent::UserLeft {
            login_id: "U1".into(),
            user_name: "Alice".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "user_left");
        assert_eq!(json["data"]["login_id"], "U1");
        assert_eq!(event.name(), "user_left");
    }

    #[test]
    fn test_error_event_from_chat_error() {
        let event = ServerEvent::error(&ChatError::validation("Message cannot be empty"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["data"]["code"], "validation_error");
    }
}
