use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    ConnectOptions, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::{MessageStore, RoleCount, RoomRegistry};
use crate::chat::{
    ChatMessage, ChatRoom, EscalationEntry, EscalationLevel, EscalationOutcome, HistoryCursor,
    MessageType, NewMessage, ReadReceipt, RoomFlag, RoomType,
};
use crate::entity::{Identity, Participant};
use crate::error::{ChatError, ChatResult};

const MESSAGE_COLUMNS: &str = "seq, id, room_id, sender_login_id, sender_role, sender_name, \
     body, message_type, file_url, created_at";

/// SQLite-backed message store and room registry.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> ChatResult<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ChatError::Storage(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options).await?;

        info!(path = %db_path.display(), "chat store opened");
        Ok(Self { pool })
    }

    /// Open a private in-memory database with the schema applied.
    ///
    /// The pool is pinned to one connection that never expires, since every
    /// SQLite memory connection is its own database.
    pub async fn in_memory() -> ChatResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> ChatResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_rooms (
                room_id TEXT PRIMARY KEY,
                room_type TEXT NOT NULL,
                owner_accepted INTEGER NOT NULL DEFAULT 0,
                tenant_assigned INTEGER NOT NULL DEFAULT 0,
                escalation_level INTEGER NOT NULL DEFAULT 0
                    CHECK (escalation_level BETWEEN 0 AND 2),
                last_message_preview TEXT,
                last_message_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_room_participants (
                room_id TEXT NOT NULL REFERENCES chat_rooms(room_id) ON DELETE CASCADE,
                login_id TEXT NOT NULL,
                role TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (room_id, login_id)
            );
            CREATE INDEX IF NOT EXISTS idx_participants_login ON chat_room_participants(login_id);

            CREATE TABLE IF NOT EXISTS chat_room_escalations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL REFERENCES chat_rooms(room_id) ON DELETE CASCADE,
                by_login_id TEXT NOT NULL,
                by_name TEXT NOT NULL,
                by_role TEXT NOT NULL,
                from_level INTEGER NOT NULL,
                to_level INTEGER NOT NULL,
                reason TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_escalations_room ON chat_room_escalations(room_id, id);

            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                room_id TEXT NOT NULL,
                sender_login_id TEXT NOT NULL,
                sender_role TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                body TEXT NOT NULL,
                message_type TEXT NOT NULL,
                file_url TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_room_created
                ON chat_messages(room_id, created_at, seq);

            CREATE TABLE IF NOT EXISTS chat_message_reads (
                message_id TEXT NOT NULL REFERENCES chat_messages(id) ON DELETE CASCADE,
                login_id TEXT NOT NULL,
                name TEXT NOT NULL,
                read_at INTEGER NOT NULL,
                PRIMARY KEY (message_id, login_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reachability check used by the health endpoint.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn fetch_messages(
        &self,
        mut query: QueryBuilder<'_, Sqlite>,
    ) -> ChatResult<Vec<ChatMessage>> {
        let rows = query.build().fetch_all(&self.pool).await?;
        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<ChatResult<Vec<_>>>()?;
        self.attach_receipts(&mut messages).await?;
        Ok(messages)
    }

    async fn attach_receipts(&self, messages: &mut [ChatMessage]) -> ChatResult<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT message_id, login_id, name, read_at FROM chat_message_reads WHERE message_id IN (",
        );
        let mut ids = query.separated(", ");
        for msg in messages.iter() {
            ids.push_bind(msg.id.clone());
        }
        ids.push_unseparated(") ORDER BY read_at, login_id");

        let rows = query.build().fetch_all(&self.pool).await?;
        for row in rows {
            let message_id: String = row.try_get("message_id")?;
            let receipt = ReadReceipt {
                login_id: row.try_get("login_id")?,
                name: row.try_get("name")?,
                read_at: from_micros(row.try_get("read_at")?)?,
            };
            if let Some(msg) = messages.iter_mut().find(|m| m.id == message_id) {
                msg.read_by.push(receipt);
            }
        }
        Ok(())
    }

    async fn require_room(&self, room_id: &str) -> ChatResult<ChatRoom> {
        let mut conn = self.pool.acquire().await?;
        load_room(&mut conn, room_id)
            .await?
            .ok_or_else(|| ChatError::room_not_found(room_id))
    }
}

#[async_trait]
impl MessageStore for Store {
    async fn append(&self, message: NewMessage) -> ChatResult<ChatMessage> {
        let mut conn = self.pool.acquire().await?;
        let stored = insert_message(&mut conn, message).await?;
        debug!(room_id = %stored.room_id, message_id = %stored.id, "message stored");
        Ok(stored)
    }

    async fn get(&self, message_id: &str) -> ChatResult<Option<ChatMessage>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = "
        ));
        query.push_bind(message_id.to_string());
        Ok(self.fetch_messages(query).await?.into_iter().next())
    }

    async fn list_by_room(
        &self,
        room_id: &str,
        limit: i64,
        before: Option<&HistoryCursor>,
    ) -> ChatResult<Vec<ChatMessage>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE room_id = "
        ));
        query.push_bind(room_id.to_string());

        match before {
            None => {}
            Some(HistoryCursor::Before(ts)) => {
                query.push(" AND created_at < ").push_bind(to_micros(*ts));
            }
            Some(HistoryCursor::BeforeMessage(message_id)) => {
                let anchor = sqlx::query(
                    "SELECT created_at, seq FROM chat_messages WHERE id = ? AND room_id = ?",
                )
                .bind(message_id)
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ChatError::NotFound(format!("message {message_id}")))?;
                let created_at: i64 = anchor.try_get("created_at")?;
                let seq: i64 = anchor.try_get("seq")?;
                query
                    .push(" AND (created_at < ")
                    .push_bind(created_at)
                    .push(" OR (created_at = ")
                    .push_bind(created_at)
                    .push(" AND seq < ")
                    .push_bind(seq)
                    .push("))");
            }
        }

        // Newest window first, then flip so the caller sees oldest -> newest.
        query
            .push(" ORDER BY created_at DESC, seq DESC LIMIT ")
            .push_bind(limit.max(0));

        let mut messages = self.fetch_messages(query).await?;
        messages.reverse();
        Ok(messages)
    }

    async fn count_by_room(&self, room_id: &str) -> ChatResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_all(&self) -> ChatResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_by_role(&self, room_id: &str) -> ChatResult<Vec<RoleCount>> {
        let rows = sqlx::query(
            r#"
            SELECT sender_role, COUNT(*) AS count
            FROM chat_messages
            WHERE room_id = ?
            GROUP BY sender_role
            ORDER BY sender_role
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> ChatResult<RoleCount> {
                let role: String = row.try_get("sender_role")?;
                Ok(RoleCount {
                    role: role.parse()?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn count_unread(&self, room_id: &str, excluding_login_id: &str) -> ChatResult<i64> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM chat_messages m
            WHERE m.room_id = ?
              AND m.sender_login_id != ?
              AND NOT EXISTS (
                  SELECT 1 FROM chat_message_reads r
                  WHERE r.message_id = m.id AND r.login_id = ?
              )
            "#,
        )
        .bind(room_id)
        .bind(excluding_login_id)
        .bind(excluding_login_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(
        &self,
        message_ids: &[String],
        reader_login_id: &str,
        reader_name: &str,
    ) -> ChatResult<DateTime<Utc>> {
        let read_at = now_micros();
        let mut tx = self.pool.begin().await?;
        for message_id in message_ids {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO chat_message_reads (message_id, login_id, name, read_at)
                SELECT id, ?, ?, ? FROM chat_messages WHERE id = ?
                "#,
            )
            .bind(reader_login_id)
            .bind(reader_name)
            .bind(to_micros(read_at))
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(read_at)
    }

    async fn mark_room_read(
        &self,
        room_id: &str,
        reader_login_id: &str,
        reader_name: &str,
    ) -> ChatResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chat_message_reads (message_id, login_id, name, read_at)
            SELECT id, ?, ?, ? FROM chat_messages
            WHERE room_id = ? AND sender_login_id != ?
            "#,
        )
        .bind(reader_login_id)
        .bind(reader_name)
        .bind(to_micros(Utc::now()))
        .bind(room_id)
        .bind(reader_login_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_id(&self, message_id: &str) -> ChatResult<bool> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_room(&self, room_id: &str) -> ChatResult<u64> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE room_id = ?")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RoomRegistry for Store {
    async fn get_or_create(
        &self,
        room_id: &str,
        room_type: RoomType,
        initial: &[Participant],
    ) -> ChatResult<ChatRoom> {
        if room_id.trim().is_empty() {
            return Err(ChatError::validation("room_id is required"));
        }

        let now = to_micros(Utc::now());
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            r#"
            INSERT INTO chat_rooms (room_id, room_type, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(room_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(room_type.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if created {
            for (position, participant) in initial.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO chat_room_participants (room_id, login_id, role, position)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(room_id)
                .bind(&participant.login_id)
                .bind(participant.role.as_str())
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
            }
            info!(room_id, room_type = room_type.as_str(), "chat room created");
        }

        let room = load_room(&mut *tx, room_id)
            .await?
            .ok_or_else(|| ChatError::room_not_found(room_id))?;
        tx.commit().await?;
        Ok(room)
    }

    async fn get(&self, room_id: &str) -> ChatResult<Option<ChatRoom>> {
        let mut conn = self.pool.acquire().await?;
        load_room(&mut conn, room_id).await
    }

    async fn add_participant(
        &self,
        room_id: &str,
        participant: &Participant,
    ) -> ChatResult<ChatRoom> {
        let mut tx = self.pool.begin().await?;

        let added = sqlx::query(
            r#"
            INSERT INTO chat_room_participants (room_id, login_id, role, position)
            SELECT r.room_id, ?, ?,
                   (SELECT COALESCE(MAX(position) + 1, 0)
                    FROM chat_room_participants WHERE room_id = r.room_id)
            FROM chat_rooms r
            WHERE r.room_id = ?
            ON CONFLICT(room_id, login_id) DO NOTHING
            "#,
        )
        .bind(&participant.login_id)
        .bind(participant.role.as_str())
        .bind(room_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if added {
            sqlx::query("UPDATE chat_rooms SET updated_at = ? WHERE room_id = ?")
                .bind(to_micros(Utc::now()))
                .bind(room_id)
                .execute(&mut *tx)
                .await?;
        }

        let room = load_room(&mut *tx, room_id)
            .await?
            .ok_or_else(|| ChatError::room_not_found(room_id))?;
        tx.commit().await?;
        Ok(room)
    }

    async fn set_flag(&self, room_id: &str, flag: RoomFlag, value: bool) -> ChatResult<ChatRoom> {
        let sql = match flag {
            RoomFlag::OwnerAccepted => {
                "UPDATE chat_rooms SET owner_accepted = ?, updated_at = ? WHERE room_id = ?"
            }
            RoomFlag::TenantAssigned => {
                "UPDATE chat_rooms SET tenant_assigned = ?, updated_at = ? WHERE room_id = ?"
            }
        };
        let result = sqlx::query(sql)
            .bind(value)
            .bind(to_micros(Utc::now()))
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ChatError::room_not_found(room_id));
        }

        info!(room_id, ?flag, value, "room flag updated");
        self.require_room(room_id).await
    }

    async fn escalate(
        &self,
        room_id: &str,
        actor: &Identity,
        reason: &str,
    ) -> ChatResult<EscalationOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // The level guard makes the bump atomic: two racing escalations at
        // level 1 cannot both move the room.
        let bumped: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE chat_rooms
            SET escalation_level = escalation_level + 1, updated_at = ?
            WHERE room_id = ? AND escalation_level < 2
            RETURNING escalation_level
            "#,
        )
        .bind(to_micros(now))
        .bind(room_id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match bumped {
            Some(level) => {
                let previous_level = EscalationLevel::new(level - 1);
                let new_level = EscalationLevel::new(level);
                sqlx::query(
                    r#"
                    INSERT INTO chat_room_escalations
                        (room_id, by_login_id, by_name, by_role, from_level, to_level, reason, timestamp)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(room_id)
                .bind(&actor.login_id)
                .bind(&actor.name)
                .bind(actor.role.as_str())
                .bind(i64::from(previous_level.value()))
                .bind(i64::from(new_level.value()))
                .bind(reason)
                .bind(to_micros(now))
                .execute(&mut *tx)
                .await?;

                let notice = insert_message(
                    &mut *tx,
                    NewMessage::escalation_notice(room_id, new_level, actor, reason),
                )
                .await?;
                sqlx::query(
                    "UPDATE chat_rooms SET last_message_preview = ?, last_message_at = ? WHERE room_id = ?",
                )
                .bind(notice.preview())
                .bind(to_micros(notice.created_at))
                .bind(room_id)
                .execute(&mut *tx)
                .await?;

                let room = load_room(&mut *tx, room_id)
                    .await?
                    .ok_or_else(|| ChatError::room_not_found(room_id))?;
                EscalationOutcome {
                    room,
                    previous_level,
                    new_level,
                    notice: Some(notice),
                }
            }
            None => {
                let room = load_room(&mut *tx, room_id)
                    .await?
                    .ok_or_else(|| ChatError::room_not_found(room_id))?;
                EscalationOutcome {
                    previous_level: room.escalation_level,
                    new_level: room.escalation_level,
                    room,
                    notice: None,
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn touch_last_message(
        &self,
        room_id: &str,
        preview: &str,
        at: DateTime<Utc>,
    ) -> ChatResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chat_rooms
            SET last_message_preview = ?, last_message_at = ?, updated_at = ?
            WHERE room_id = ?
            "#,
        )
        .bind(preview)
        .bind(to_micros(at))
        .bind(to_micros(Utc::now()))
        .bind(room_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ChatError::room_not_found(room_id));
        }
        Ok(())
    }

    async fn clear_last_message(&self, room_id: &str) -> ChatResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chat_rooms
            SET last_message_preview = NULL, last_message_at = NULL, updated_at = ?
            WHERE room_id = ?
            "#,
        )
        .bind(to_micros(Utc::now()))
        .bind(room_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ChatError::room_not_found(room_id));
        }
        Ok(())
    }

    async fn list_for_participant(&self, login_id: &str) -> ChatResult<Vec<ChatRoom>> {
        let mut conn = self.pool.acquire().await?;
        let room_ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.room_id FROM chat_rooms r
            JOIN chat_room_participants p ON p.room_id = r.room_id
            WHERE p.login_id = ?
            ORDER BY r.updated_at DESC, r.room_id
            "#,
        )
        .bind(login_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut rooms = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            if let Some(room) = load_room(&mut conn, &room_id).await? {
                rooms.push(room);
            }
        }
        Ok(rooms)
    }

    async fn count(&self) -> ChatResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM chat_rooms")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn load_room(conn: &mut SqliteConnection, room_id: &str) -> ChatResult<Option<ChatRoom>> {
    let Some(row) = sqlx::query(
        r#"
        SELECT room_id, room_type, owner_accepted, tenant_assigned, escalation_level,
               last_message_preview, last_message_at, created_at, updated_at
        FROM chat_rooms WHERE room_id = ?
        "#,
    )
    .bind(room_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let participants = sqlx::query(
        "SELECT login_id, role FROM chat_room_participants WHERE room_id = ? ORDER BY position",
    )
    .bind(room_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|p| -> ChatResult<Participant> {
        let role: String = p.try_get("role")?;
        Ok(Participant::new(p.try_get::<String, _>("login_id")?, role.parse()?))
    })
    .collect::<ChatResult<Vec<_>>>()?;

    let escalation_history = sqlx::query(
        r#"
        SELECT by_login_id, by_name, by_role, from_level, to_level, reason, timestamp
        FROM chat_room_escalations WHERE room_id = ? ORDER BY id
        "#,
    )
    .bind(room_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|e| -> ChatResult<EscalationEntry> {
        let by_role: String = e.try_get("by_role")?;
        Ok(EscalationEntry {
            by_login_id: e.try_get("by_login_id")?,
            by_name: e.try_get("by_name")?,
            by_role: by_role.parse()?,
            from_level: EscalationLevel::new(e.try_get("from_level")?),
            to_level: EscalationLevel::new(e.try_get("to_level")?),
            reason: e.try_get("reason")?,
            timestamp: from_micros(e.try_get("timestamp")?)?,
        })
    })
    .collect::<ChatResult<Vec<_>>>()?;

    let room_type: String = row.try_get("room_type")?;
    let last_message_at: Option<i64> = row.try_get("last_message_at")?;

    Ok(Some(ChatRoom {
        room_id: row.try_get("room_id")?,
        room_type: room_type.parse()?,
        participants,
        owner_accepted: row.try_get("owner_accepted")?,
        tenant_assigned: row.try_get("tenant_assigned")?,
        escalation_level: EscalationLevel::new(row.try_get("escalation_level")?),
        escalation_history,
        last_message_preview: row.try_get("last_message_preview")?,
        last_message_at: last_message_at.map(from_micros).transpose()?,
        created_at: from_micros(row.try_get("created_at")?)?,
        updated_at: from_micros(row.try_get("updated_at")?)?,
    }))
}

/// Validates and inserts one message, assigning its id and timestamp.
async fn insert_message(
    conn: &mut SqliteConnection,
    mut message: NewMessage,
) -> ChatResult<ChatMessage> {
    message.validate()?;

    let stored = ChatMessage {
        id: Uuid::new_v4().to_string(),
        room_id: message.room_id,
        sender_login_id: message.sender.login_id,
        sender_role: message.sender.role,
        sender_name: message.sender.name,
        message: message.body,
        message_type: message.message_type,
        file_url: message.file_url,
        read_by: Vec::new(),
        created_at: now_micros(),
    };

    sqlx::query(
        r#"
        INSERT INTO chat_messages
            (id, room_id, sender_login_id, sender_role, sender_name, body, message_type, file_url, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&stored.id)
    .bind(&stored.room_id)
    .bind(&stored.sender_login_id)
    .bind(stored.sender_role.as_str())
    .bind(&stored.sender_name)
    .bind(&stored.message)
    .bind(stored.message_type.as_str())
    .bind(&stored.file_url)
    .bind(to_micros(stored.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(stored)
}

fn message_from_row(row: &SqliteRow) -> ChatResult<ChatMessage> {
    let sender_role: String = row.try_get("sender_role")?;
    let message_type: String = row.try_get("message_type")?;
    Ok(ChatMessage {
        id: row.try_get("id")?,
        room_id: row.try_get("room_id")?,
        sender_login_id: row.try_get("sender_login_id")?,
        sender_role: sender_role.parse()?,
        sender_name: row.try_get("sender_name")?,
        message: row.try_get("body")?,
        message_type: MessageType::from_str(&message_type)?,
        file_url: row.try_get("file_url")?,
        read_by: Vec::new(),
        created_at: from_micros(row.try_get("created_at")?)?,
    })
}

/// Current time at the precision the columns store.
fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> ChatResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| ChatError::Storage(format!("timestamp out of range: {micros}")))
}
