use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::chat::{ChatMessage, ChatRoom, EscalationLevel, HistoryCursor, RoomFlag, RoomType};
use crate::coordinator::ChatCoordinator;
use crate::entity::{Participant, Role};
use crate::error::{ChatError, ChatResult, PermissionDenied};
use crate::store::RoleCount;
use crate::ws::ws_handler;

type AppState = Arc<ChatCoordinator>;

const MAX_PAGE: i64 = 500;

// -----------------------------------------------------------------------------
// Request / response types
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub before: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnreadParams {
    pub login_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkRoomRead {
    pub login_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoom {
    pub room_id: String,
    pub room_type: RoomType,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub owner_accepted: Option<bool>,
    #[serde(default)]
    pub tenant_assigned: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FlagUpdate {
    pub flag: RoomFlag,
    pub value: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClearRoom {
    pub user_role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub store: bool,
    pub rooms: i64,
    pub messages: i64,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct RoomStats {
    pub room_id: String,
    pub total_messages: i64,
    pub by_role: Vec<RoleCount>,
    pub participants: usize,
    pub escalation_level: EscalationLevel,
}

// -----------------------------------------------------------------------------
// Router
// -----------------------------------------------------------------------------

pub fn router(coordinator: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health))
        .route("/api/chat/health", get(chat_health))
        .route("/api/chat/messages/:room_id", get(get_messages))
        .route("/api/chat/mark-read/:room_id", post(mark_room_read))
        .route("/api/chat/unread/:room_id", get(unread_count))
        .route("/api/chat/message/:message_id", delete(delete_message))
        .route("/api/chat/rooms", post(create_room))
        .route("/api/chat/rooms/:login_id", get(rooms_for_user))
        .route("/api/chat/room/:room_id", get(get_room))
        .route("/api/chat/room/:room_id/flags", put(set_room_flag))
        .route("/api/chat/stats/:room_id", get(room_stats))
        .route("/api/chat/clear/:room_id", post(clear_room))
        .with_state(coordinator)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "roomhy-chat" }))
}

async fn chat_health(State(state): State<AppState>) -> Json<HealthStatus> {
    let rooms = state.rooms().count().await;
    let messages = state.messages().count_all().await;
    let store = rooms.is_ok() && messages.is_ok();
    Json(HealthStatus {
        status: if store { "ok" } else { "degraded" }.to_string(),
        store,
        rooms: rooms.unwrap_or_default(),
        messages: messages.unwrap_or_default(),
        connections: state.hub().connection_count().await,
    })
}

/// Oldest-first window of up to `limit` messages before the cursor.
async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ChatResult<Json<Vec<ChatMessage>>> {
    let limit = params
        .limit
        .unwrap_or(state.config().history_limit)
        .clamp(1, MAX_PAGE);
    let cursor = params
        .before
        .as_deref()
        .filter(|b| !b.is_empty())
        .map(HistoryCursor::parse);
    let messages = state
        .messages()
        .list_by_room(&room_id, limit, cursor.as_ref())
        .await?;
    Ok(Json(messages))
}

async fn mark_room_read(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<MarkRoomRead>,
) -> ChatResult<Json<Value>> {
    let login_id = body.login_id.trim();
    if login_id.is_empty() {
        return Err(ChatError::validation("login_id is required"));
    }
    let name = body
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(login_id);
    let marked = state
        .messages()
        .mark_room_read(&room_id, login_id, name)
        .await?;
    Ok(Json(json!({ "success": true, "marked": marked })))
}

async fn unread_count(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<UnreadParams>,
) -> ChatResult<Json<Value>> {
    let count = state
        .messages()
        .count_unread(&room_id, &params.login_id)
        .await?;
    Ok(Json(json!({ "unread_count": count })))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> ChatResult<Json<Value>> {
    let deleted = state.messages().delete_by_id(&message_id).await?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

async fn rooms_for_user(
    State(state): State<AppState>,
    Path(login_id): Path<String>,
) -> ChatResult<Json<Vec<ChatRoom>>> {
    Ok(Json(state.rooms().list_for_participant(&login_id).await?))
}

async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ChatResult<Json<ChatRoom>> {
    state
        .rooms()
        .get(&room_id)
        .await?
        .map(Json)
        .ok_or_else(|| ChatError::room_not_found(&room_id))
}

/// Booking acceptance: opens the typed room for its participants.
async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoom>,
) -> ChatResult<Json<ChatRoom>> {
    let room_id = body.room_id.trim();
    if room_id.is_empty() {
        return Err(ChatError::validation("room_id is required"));
    }
    if body.participants.iter().any(|p| p.role == Role::System) {
        return Err(ChatError::validation("system cannot be a room participant"));
    }

    let rooms = state.rooms();
    let mut room = rooms
        .get_or_create(room_id, body.room_type, &body.participants)
        .await?;
    if let Some(value) = body.owner_accepted {
        room = rooms.set_flag(room_id, RoomFlag::OwnerAccepted, value).await?;
    }
    if let Some(value) = body.tenant_assigned {
        room = rooms.set_flag(room_id, RoomFlag::TenantAssigned, value).await?;
    }
    info!(room_id, room_type = room.room_type.as_str(), "room opened");
    Ok(Json(room))
}

async fn set_room_flag(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<FlagUpdate>,
) -> ChatResult<Json<ChatRoom>> {
    let room = state
        .rooms()
        .set_flag(&room_id, body.flag, body.value)
        .await?;
    info!(room_id = %room_id, flag = ?body.flag, value = body.value, "room flag updated");
    Ok(Json(room))
}

async fn room_stats(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ChatResult<Json<RoomStats>> {
    let room = state
        .rooms()
        .get(&room_id)
        .await?
        .ok_or_else(|| ChatError::room_not_found(&room_id))?;
    let total_messages = state.messages().count_by_room(&room_id).await?;
    let by_role = state.messages().count_by_role(&room_id).await?;
    Ok(Json(RoomStats {
        room_id,
        total_messages,
        by_role,
        participants: room.participants.len(),
        escalation_level: room.escalation_level,
    }))
}

/// Superadmin only. Deletes the room's messages; the room itself stays.
async fn clear_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<ClearRoom>,
) -> ChatResult<Json<Value>> {
    if body.user_role != Role::SuperAdmin {
        return Err(PermissionDenied::RoleNotAllowed.into());
    }
    if state.rooms().get(&room_id).await?.is_none() {
        return Err(ChatError::room_not_found(&room_id));
    }
    let deleted = state.messages().delete_by_room(&room_id).await?;
    state.rooms().clear_last_message(&room_id).await?;
    info!(room_id = %room_id, deleted, "room history cleared");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}
