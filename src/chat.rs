use crate::entity::{Identity, Participant, Role};
use crate::error::{ChatError, ChatResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Characters kept in a room's denormalized last-message preview.
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    File,
    System,
    Escalation,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::System => "system",
            MessageType::Escalation => "escalation",
        }
    }

    pub fn needs_file(&self) -> bool {
        matches!(self, MessageType::Image | MessageType::File)
    }
}

impl FromStr for MessageType {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            "system" => Ok(MessageType::System),
            "escalation" => Ok(MessageType::Escalation),
            other => Err(ChatError::validation(format!("unknown message type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub login_id: String,
    pub name: String,
    pub read_at: DateTime<Utc>,
}

/// A persisted chat message. Only `read_by` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub sender_login_id: String,
    pub sender_role: Role,
    pub sender_name: String,
    pub message: String,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub read_by: Vec<ReadReceipt>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Room list preview. Bodiless messages show their type instead.
    pub fn preview(&self) -> String {
        if self.message.is_empty() {
            format!("[{}]", self.message_type.as_str())
        } else {
            preview(&self.message)
        }
    }
}

/// A message as submitted, before the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub sender: Identity,
    pub body: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
}

impl NewMessage {
    pub fn text(room_id: impl Into<String>, sender: Identity, body: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            sender,
            body: body.into(),
            message_type: MessageType::Text,
            file_url: None,
        }
    }

    pub fn system(room_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            sender: Identity::system(),
            body: body.into(),
            message_type: MessageType::System,
            file_url: None,
        }
    }

    pub fn escalation(room_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Escalation,
            ..Self::system(room_id, body)
        }
    }

    /// The notice posted when `actor` moves a room up to `level`.
    pub fn escalation_notice(
        room_id: impl Into<String>,
        level: EscalationLevel,
        actor: &Identity,
        reason: &str,
    ) -> Self {
        Self::escalation(
            room_id,
            format!(
                "Chat escalated to {} by {} - Reason: {}",
                level.target(),
                actor.name,
                reason
            ),
        )
    }

    /// Checks required fields. Text is trimmed in place.
    pub fn validate(&mut self) -> ChatResult<()> {
        if self.room_id.trim().is_empty() {
            return Err(ChatError::validation("room_id is required"));
        }
        if self.sender.login_id.trim().is_empty() {
            return Err(ChatError::validation("sender login_id is required"));
        }
        self.body = self.body.trim().to_string();
        self.file_url = self
            .file_url
            .take()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        if self.message_type.needs_file() && self.file_url.is_none() {
            return Err(ChatError::validation(format!(
                "file_url is required for {} messages",
                self.message_type.as_str()
            )));
        }
        if self.body.is_empty() && self.file_url.is_none() {
            return Err(ChatError::validation("Message cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    OwnerWebsiteUser,
    OwnerTenant,
    Generic,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::OwnerWebsiteUser => "owner_website_user",
            RoomType::OwnerTenant => "owner_tenant",
            RoomType::Generic => "generic",
        }
    }
}

impl FromStr for RoomType {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner_website_user" => Ok(RoomType::OwnerWebsiteUser),
            "owner_tenant" => Ok(RoomType::OwnerTenant),
            "generic" => Ok(RoomType::Generic),
            other => Err(ChatError::validation(format!("unknown room type: {other}"))),
        }
    }
}

/// Business-state gates on a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomFlag {
    OwnerAccepted,
    TenantAssigned,
}

/// Escalation level, clamped to `0..=2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscalationLevel(u8);

impl EscalationLevel {
    pub const NORMAL: Self = Self(0);
    pub const AREA_MANAGER: Self = Self(1);
    pub const SUPER_ADMIN: Self = Self(2);

    pub fn new(level: i64) -> Self {
        Self(level.clamp(0, 2) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_max(&self) -> bool {
        *self == Self::SUPER_ADMIN
    }

    /// Who the room is routed to at this level.
    pub fn target(&self) -> &'static str {
        match self.0 {
            0 => "Normal",
            1 => "Area Manager",
            _ => "Super Admin",
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEntry {
    pub by_login_id: String,
    pub by_name: String,
    pub by_role: Role,
    pub from_level: EscalationLevel,
    pub to_level: EscalationLevel,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of `RoomRegistry::escalate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationOutcome {
    /// The room as committed by this escalation.
    pub room: ChatRoom,
    pub previous_level: EscalationLevel,
    pub new_level: EscalationLevel,
    /// Escalation notice stored with the level change. `None` at the cap.
    pub notice: Option<ChatMessage>,
}

impl EscalationOutcome {
    /// The room was already at level 2 and nothing changed.
    pub fn already_max(&self) -> bool {
        self.previous_level.is_max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub room_id: String,
    pub room_type: RoomType,
    pub participants: Vec<Participant>,
    pub owner_accepted: bool,
    pub tenant_assigned: bool,
    pub escalation_level: EscalationLevel,
    pub escalation_history: Vec<EscalationEntry>,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn is_participant(&self, login_id: &str) -> bool {
        self.participants.iter().any(|p| p.login_id == login_id)
    }

    /// Participants other than `login_id`.
    pub fn counterparts<'a>(&'a self, login_id: &'a str) -> impl Iterator<Item = &'a Participant> {
        self.participants.iter().filter(move |p| p.login_id != login_id)
    }
}

/// Restart point for paging backwards through a room's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryCursor {
    /// Messages strictly older than this instant.
    Before(DateTime<Utc>),
    /// Messages strictly older than this message.
    BeforeMessage(String),
}

impl HistoryCursor {
    /// RFC 3339 timestamps become `Before`; anything else is a message id.
    pub fn parse(raw: &str) -> Self {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => HistoryCursor::Before(ts.with_timezone(&Utc)),
            Err(_) => HistoryCursor::BeforeMessage(raw.to_string()),
        }
    }
}

/// Truncate a message body for list views.
pub fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_level_clamps() {
        assert_eq!(EscalationLevel::new(-3), EscalationLevel::NORMAL);
        assert_eq!(EscalationLevel::new(7), EscalationLevel::SUPER_ADMIN);
        assert!(EscalationLevel::SUPER_ADMIN.is_max());
        assert!(!EscalationLevel::AREA_MANAGER.is_max());
        assert_eq!(EscalationLevel::SUPER_ADMIN.target(), "Super Admin");
    }

    #[test]
    fn test_validate_trims_and_rejects_empty() {
        let sender = Identity::new("U1", "Alice", Role::WebsiteUser);
        let mut msg = NewMessage::text("R1", sender.clone(), "  Hi  ");
        msg.validate().unwrap();
        assert_eq!(msg.body, "Hi");

        let mut empty = NewMessage::text("R1", sender.clone(), "   ");
        assert!(matches!(empty.validate(), Err(ChatError::Validation(_))));

        let mut no_room = NewMessage::text(" ", sender, "Hi");
        assert!(matches!(no_room.validate(), Err(ChatError::Validation(_))));
    }

    #[test]
    fn test_validate_file_messages() {
        let sender = Identity::new("P1", "Priya", Role::PropertyOwner);
        let mut image = NewMessage {
            room_id: "R1".into(),
            sender: sender.clone(),
            body: String::new(),
            message_type: MessageType::Image,
            file_url: None,
        };
        assert!(image.validate().is_err());

        image.file_url = Some("https://cdn.example/room.jpg".into());
        image.validate().unwrap();

        let mut text_with_file = NewMessage {
            file_url: Some("https://cdn.example/lease.pdf".into()),
            ..NewMessage::text("R1", sender, "")
        };
        text_with_file.validate().unwrap();
    }

    #[test]
    fn test_history_cursor_parse() {
        assert!(matches!(
            HistoryCursor::parse("2026-01-02T03:04:05Z"),
            HistoryCursor::Before(_)
        ));
        assert_eq!(
            HistoryCursor::parse("b1c2"),
            HistoryCursor::BeforeMessage("b1c2".into())
        );
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_escalation_notice_names_target_and_actor() {
        let actor = Identity::new("U1", "Alice", Role::WebsiteUser);
        let notice =
            NewMessage::escalation_notice("R1", EscalationLevel::AREA_MANAGER, &actor, "no response");
        assert_eq!(notice.message_type, MessageType::Escalation);
        assert_eq!(notice.sender.role, Role::System);
        assert_eq!(
            notice.body,
            "Chat escalated to Area Manager by Alice - Reason: no response"
        );
    }
}
