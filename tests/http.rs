//! Router tests for the HTTP collaborator surface.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use roomhy_chat::chat::{ChatMessage, ChatRoom, NewMessage, RoomType};
use roomhy_chat::config::Config;
use roomhy_chat::entity::{Identity, Participant, Role};
use roomhy_chat::http::{router, HealthStatus};
use roomhy_chat::store::{MessageStore, RoomRegistry, Store};
use roomhy_chat::ChatCoordinator;

// =============================================================================
// Helpers
// =============================================================================

async fn make_app() -> (axum::Router, Store) {
    let store = Store::in_memory().await.unwrap();
    let coordinator = Arc::new(ChatCoordinator::with_store(store.clone(), Config::default()));
    (router(coordinator), store)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_room(store: &Store) {
    store
        .get_or_create(
            "R1",
            RoomType::OwnerWebsiteUser,
            &[
                Participant::new("P1", Role::PropertyOwner),
                Participant::new("U1", Role::WebsiteUser),
            ],
        )
        .await
        .unwrap();
}

async fn say(store: &Store, login_id: &str, role: Role, body: &str) -> ChatMessage {
    let sender = Identity::new(login_id, login_id, role);
    store.append(NewMessage::text("R1", sender, body)).await.unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (app, _store) = make_app().await;
    let resp = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "ok");
}

#[tokio::test]
async fn test_chat_health_reports_counts() {
    let (app, store) = make_app().await;
    seed_room(&store).await;
    say(&store, "U1", Role::WebsiteUser, "hello").await;

    let resp = app.oneshot(get("/api/chat/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthStatus = serde_json::from_value(body_json(resp).await).unwrap();
    assert!(health.store);
    assert_eq!(health.rooms, 1);
    assert_eq!(health.messages, 1);
    assert_eq!(health.connections, 0);
}

// =============================================================================
// Messages
// =============================================================================

#[tokio::test]
async fn test_messages_window_and_cursor() {
    let (app, store) = make_app().await;
    seed_room(&store).await;
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(say(&store, "U1", Role::WebsiteUser, &format!("m{i}")).await.id);
    }

    let resp = app
        .clone()
        .oneshot(get("/api/chat/messages/R1?limit=2"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let messages: Vec<ChatMessage> = serde_json::from_value(body_json(resp).await).unwrap();
    let bodies: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(bodies, vec!["m2", "m3"]);

    let uri = format!("/api/chat/messages/R1?limit=10&before={}", ids[2]);
    let resp = app.clone().oneshot(get(&uri)).await.unwrap();
    let messages: Vec<ChatMessage> = serde_json::from_value(body_json(resp).await).unwrap();
    let bodies: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(bodies, vec!["m0", "m1"]);

    let resp = app
        .oneshot(get("/api/chat/messages/R1?before=no-such-message"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mark_read_and_unread_count() {
    let (app, store) = make_app().await;
    seed_room(&store).await;
    say(&store, "U1", Role::WebsiteUser, "one").await;
    say(&store, "U1", Role::WebsiteUser, "two").await;
    say(&store, "P1", Role::PropertyOwner, "mine").await;

    let resp = app
        .clone()
        .oneshot(get("/api/chat/unread/R1?login_id=P1"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["unread_count"], 2);

    let resp = app
        .clone()
        .oneshot(with_json(
            "POST",
            "/api/chat/mark-read/R1",
            json!({ "login_id": "P1", "user_name": "Priya" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["success"], true);

    let resp = app
        .oneshot(get("/api/chat/unread/R1?login_id=P1"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["unread_count"], 0);
}

#[tokio::test]
async fn test_mark_read_requires_login() {
    let (app, store) = make_app().await;
    seed_room(&store).await;
    let resp = app
        .oneshot(with_json(
            "POST",
            "/api/chat/mark-read/R1",
            json!({ "login_id": " " }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "validation_error");
}

#[tokio::test]
async fn test_delete_message_is_not_an_error_when_missing() {
    let (app, store) = make_app().await;
    seed_room(&store).await;
    let message = say(&store, "U1", Role::WebsiteUser, "oops").await;

    let uri = format!("/api/chat/message/{}", message.id);
    let resp = app
        .clone()
        .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "success": true, "deleted": true }));

    let resp = app
        .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["deleted"], false);
}

// =============================================================================
// Rooms
// =============================================================================

#[tokio::test]
async fn test_create_room_with_flags() {
    let (app, store) = make_app().await;
    let body = json!({
        "room_id": "B7",
        "room_type": "owner_website_user",
        "participants": [
            { "login_id": "P1", "role": "property_owner" },
            { "login_id": "U1", "role": "website_user" }
        ],
        "owner_accepted": true
    });
    let resp = app
        .clone()
        .oneshot(with_json("POST", "/api/chat/rooms", body.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let room: ChatRoom = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(room.room_type, RoomType::OwnerWebsiteUser);
    assert!(room.owner_accepted);
    assert_eq!(room.participants.len(), 2);

    // Repeat acceptance leaves the participant set alone.
    app.oneshot(with_json("POST", "/api/chat/rooms", body))
        .await
        .unwrap();
    let room = RoomRegistry::get(&store, "B7").await.unwrap().unwrap();
    assert_eq!(room.participants.len(), 2);
}

#[tokio::test]
async fn test_create_room_rejects_system_participant() {
    let (app, _store) = make_app().await;
    let body = json!({
        "room_id": "B8",
        "room_type": "generic",
        "participants": [{ "login_id": "system", "role": "system" }]
    });
    let resp = app
        .oneshot(with_json("POST", "/api/chat/rooms", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_room_detail_and_flags() {
    let (app, store) = make_app().await;
    seed_room(&store).await;

    let resp = app
        .clone()
        .oneshot(get("/api/chat/room/missing"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "not_found");

    let resp = app
        .clone()
        .oneshot(with_json(
            "PUT",
            "/api/chat/room/R1/flags",
            json!({ "flag": "owner_accepted", "value": true }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/api/chat/room/R1")).await.unwrap();
    let room: ChatRoom = serde_json::from_value(body_json(resp).await).unwrap();
    assert!(room.owner_accepted);
    assert!(!room.tenant_assigned);
}

#[tokio::test]
async fn test_rooms_for_user() {
    let (app, store) = make_app().await;
    seed_room(&store).await;
    store
        .get_or_create("G1", RoomType::Generic, &[Participant::new("U1", Role::WebsiteUser)])
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(get("/api/chat/rooms/U1"))
        .await
        .unwrap();
    let rooms: Vec<ChatRoom> = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(rooms.len(), 2);

    let resp = app.oneshot(get("/api/chat/rooms/P1")).await.unwrap();
    let rooms: Vec<ChatRoom> = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].room_id, "R1");
}

#[tokio::test]
async fn test_room_stats() {
    let (app, store) = make_app().await;
    seed_room(&store).await;
    say(&store, "U1", Role::WebsiteUser, "a").await;
    say(&store, "U1", Role::WebsiteUser, "b").await;
    say(&store, "P1", Role::PropertyOwner, "c").await;

    let resp = app.oneshot(get("/api/chat/stats/R1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let stats = body_json(resp).await;
    assert_eq!(stats["total_messages"], 3);
    assert_eq!(stats["participants"], 2);
    assert_eq!(stats["escalation_level"], 0);
    let by_role = stats["by_role"].as_array().unwrap();
    assert!(by_role.contains(&json!({ "role": "website_user", "count": 2 })));
    assert!(by_role.contains(&json!({ "role": "property_owner", "count": 1 })));
}

#[tokio::test]
async fn test_clear_room_is_superadmin_only() {
    let (app, store) = make_app().await;
    seed_room(&store).await;
    let message = say(&store, "U1", Role::WebsiteUser, "bye").await;
    store
        .touch_last_message("R1", "bye", message.created_at)
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(with_json(
            "POST",
            "/api/chat/clear/R1",
            json!({ "user_role": "areamanager" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(store.count_by_room("R1").await.unwrap(), 1);

    let resp = app
        .oneshot(with_json(
            "POST",
            "/api/chat/clear/R1",
            json!({ "user_role": "superadmin" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["deleted"], 1);
    assert_eq!(store.count_by_room("R1").await.unwrap(), 0);
    let room = RoomRegistry::get(&store, "R1").await.unwrap().unwrap();
    assert!(room.last_message_preview.is_none());
    assert!(!room.owner_accepted);
}
