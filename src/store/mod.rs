//! Persistence seams for the chat core.
//!
//! `MessageStore` and `RoomRegistry` are the only writers of chat state. Both
//! must serialize conflicting writes themselves; callers hold no locks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;

use crate::chat::{
    ChatMessage, ChatRoom, EscalationOutcome, HistoryCursor, NewMessage, RoomFlag, RoomType,
};
use crate::entity::{Identity, Participant, Role};
use crate::error::ChatResult;

mod sqlite;

pub use sqlite::Store;

/// Default window returned by `list_by_room`.
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleCount {
    pub role: Role,
    pub count: i64,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Validates and persists a message. `id` and `created_at` are assigned here.
    async fn append(&self, message: NewMessage) -> ChatResult<ChatMessage>;

    async fn get(&self, message_id: &str) -> ChatResult<Option<ChatMessage>>;

    /// Up to `limit` messages older than `before`, oldest first.
    async fn list_by_room(
        &self,
        room_id: &str,
        limit: i64,
        before: Option<&HistoryCursor>,
    ) -> ChatResult<Vec<ChatMessage>>;

    async fn count_by_room(&self, room_id: &str) -> ChatResult<i64>;

    async fn count_all(&self) -> ChatResult<i64>;

    async fn count_by_role(&self, room_id: &str) -> ChatResult<Vec<RoleCount>>;

    /// Messages in the room not sent by, and not yet read by, `login_id`.
    async fn count_unread(&self, room_id: &str, excluding_login_id: &str) -> ChatResult<i64>;

    /// Idempotent. Unknown ids and repeat reads are ignored.
    async fn mark_read(
        &self,
        message_ids: &[String],
        reader_login_id: &str,
        reader_name: &str,
    ) -> ChatResult<DateTime<Utc>>;

    /// Marks every message in the room read by the reader. Returns how many
    /// receipts were newly added.
    async fn mark_room_read(
        &self,
        room_id: &str,
        reader_login_id: &str,
        reader_name: &str,
    ) -> ChatResult<u64>;

    /// `false` if the message did not exist.
    async fn delete_by_id(&self, message_id: &str) -> ChatResult<bool>;

    async fn delete_by_room(&self, room_id: &str) -> ChatResult<u64>;
}

#[async_trait]
pub trait RoomRegistry: Send + Sync {
    /// Creates the room on first access. Later calls return the stored room
    /// unchanged, whatever `room_type` and `initial` say.
    async fn get_or_create(
        &self,
        room_id: &str,
        room_type: RoomType,
        initial: &[Participant],
    ) -> ChatResult<ChatRoom>;

    async fn get(&self, room_id: &str) -> ChatResult<Option<ChatRoom>>;

    /// Set semantics on `login_id`. `NotFound` if the room is absent.
    async fn add_participant(&self, room_id: &str, participant: &Participant)
        -> ChatResult<ChatRoom>;

    async fn set_flag(&self, room_id: &str, flag: RoomFlag, value: bool) -> ChatResult<ChatRoom>;

    /// Raises the level by one, capped at 2. The level change, its history
    /// entry and the escalation notice are written together or not at all.
    /// At the cap nothing is written and the outcome carries no notice.
    async fn escalate(
        &self,
        room_id: &str,
        actor: &Identity,
        reason: &str,
    ) -> ChatResult<EscalationOutcome>;

    async fn touch_last_message(
        &self,
        room_id: &str,
        preview: &str,
        at: DateTime<Utc>,
    ) -> ChatResult<()>;

    async fn clear_last_message(&self, room_id: &str) -> ChatResult<()>;

    /// Rooms the user participates in, most recently updated first.
    async fn list_for_participant(&self, login_id: &str) -> ChatResult<Vec<ChatRoom>>;

    async fn count(&self) -> ChatResult<i64>;
}

/// Walks a room's history backwards one page at a time, newest page first.
///
/// Pages are fetched lazily as the stream is polled; each page is itself
/// oldest-first. The stream ends after the first short page.
pub fn history_pages(
    store: Arc<dyn MessageStore>,
    room_id: String,
    page_size: i64,
) -> impl Stream<Item = ChatResult<Vec<ChatMessage>>> {
    async_stream::try_stream! {
        let page_size = page_size.max(1);
        let mut cursor: Option<HistoryCursor> = None;
        loop {
            let page = store.list_by_room(&room_id, page_size, cursor.as_ref()).await?;
            let Some(oldest) = page.first() else {
                break;
            };
            cursor = Some(HistoryCursor::BeforeMessage(oldest.id.clone()));
            let short = (page.len() as i64) < page_size;
            yield page;
            if short {
                break;
            }
        }
    }
}
