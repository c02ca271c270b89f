use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::{query::Query, sqlite::{SqliteArguments, SqliteRow}, Row, Sqlite, SqlitePool};

use crate::common::{
    ordered_pair, ContactPrivacy, MessageRow, MessageTarget, Profile, ProfileRole, StoreError, StoreResult,
    SystemMessageType, Thread, ThreadMember, TypingStatus,
};
use crate::server::database::Database;
use crate::server::store::{ConnectionStore, MessageStore, ProfileStore, ThreadStore, TypingStore};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, thread_id, text, created_at, read_at, image_url, file_url, file_name, system_message_type";
const INSERT_MESSAGE: &str = "INSERT INTO messages (id, sender_id, receiver_id, thread_id, text, created_at, read_at, image_url, file_url, file_name, system_message_type) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const PROFILE_COLUMNS: &str = "id, first_name, last_name, avatar_url, email, phone, contact_privacy, role, created_at";

/// Store backed by the SQLite tables created in `Database::migrate`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(millis: i64, table: &'static str) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| StoreError::Corrupt {
        table,
        reason: format!("timestamp {} out of range", millis),
    })
}

/// Ids bound per `IN (...)` list, well under SQLite's bound-parameter limit.
const IN_CHUNK: usize = 500;

/// "?, ?, ?" for an IN clause of `n` values
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn insert_message_query(message: &MessageRow) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let (receiver_id, thread_id) = match &message.target {
        MessageTarget::Direct { receiver_id } => (Some(receiver_id.as_str()), None),
        MessageTarget::Thread { thread_id } => (None, Some(thread_id.as_str())),
    };
    sqlx::query(INSERT_MESSAGE)
        .bind(&message.id)
        .bind(&message.sender_id)
        .bind(receiver_id)
        .bind(thread_id)
        .bind(&message.text)
        .bind(to_millis(message.created_at))
        .bind(message.read_at.map(to_millis))
        .bind(&message.image_url)
        .bind(&message.file_url)
        .bind(&message.file_name)
        .bind(message.system_message_type.map(|t| t.as_str()))
}

fn profile_from_row(row: &SqliteRow) -> StoreResult<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        avatar_url: row.try_get("avatar_url")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        contact_privacy: ContactPrivacy::from_setting(row.try_get::<Option<String>, _>("contact_privacy")?.as_deref()),
        role: ProfileRole::from_setting(row.try_get::<Option<String>, _>("role")?.as_deref()),
        created_at: from_millis(row.try_get("created_at")?, "profiles")?,
    })
}

fn message_from_row(row: &SqliteRow) -> StoreResult<MessageRow> {
    let id: String = row.try_get("id")?;
    let receiver_id: Option<String> = row.try_get("receiver_id")?;
    let thread_id: Option<String> = row.try_get("thread_id")?;
    let target = match (receiver_id, thread_id) {
        (Some(receiver_id), None) => MessageTarget::Direct { receiver_id },
        (None, Some(thread_id)) => MessageTarget::Thread { thread_id },
        _ => {
            return Err(StoreError::Corrupt {
                table: "messages",
                reason: format!("message {} must have exactly one of receiver_id, thread_id", id),
            })
        }
    };
    let system_message_type = match row.try_get::<Option<String>, _>("system_message_type")? {
        Some(raw) => Some(SystemMessageType::parse(&raw).ok_or_else(|| StoreError::Corrupt {
            table: "messages",
            reason: format!("message {} has unknown system type {:?}", id, raw),
        })?),
        None => None,
    };
    let read_at = match row.try_get::<Option<i64>, _>("read_at")? {
        Some(millis) => Some(from_millis(millis, "messages")?),
        None => None,
    };

    Ok(MessageRow {
        sender_id: row.try_get("sender_id")?,
        target,
        text: row.try_get::<Option<String>, _>("text")?.unwrap_or_default(),
        created_at: from_millis(row.try_get("created_at")?, "messages")?,
        read_at,
        image_url: row.try_get("image_url")?,
        file_url: row.try_get("file_url")?,
        file_name: row.try_get("file_name")?,
        system_message_type,
        id,
    })
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn connection_exists(&self, a: &str, b: &str) -> StoreResult<bool> {
        let (lo, hi) = ordered_pair(a, b);
        let row = sqlx::query("SELECT 1 FROM connections WHERE user_a = ? AND user_b = ?")
            .bind(lo)
            .bind(hi)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    async fn insert_connection(&self, a: &str, b: &str) -> StoreResult<()> {
        let (lo, hi) = ordered_pair(a, b);
        sqlx::query("INSERT OR IGNORE INTO connections (user_a, user_b, created_at) VALUES (?, ?, ?)")
            .bind(lo)
            .bind(hi)
            .bind(to_millis(Utc::now()))
            .execute(self.pool())
            .await?;
        info!("[STORE] Connection {} <-> {} recorded", lo, hi);
        Ok(())
    }

    async fn remove_connection(&self, a: &str, b: &str) -> StoreResult<()> {
        let (lo, hi) = ordered_pair(a, b);
        sqlx::query("DELETE FROM connections WHERE user_a = ? AND user_b = ?")
            .bind(lo)
            .bind(hi)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO profiles ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)", PROFILE_COLUMNS))
            .bind(&profile.id)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.avatar_url)
            .bind(&profile.email)
            .bind(&profile.phone)
            .bind(profile.contact_privacy.as_str())
            .bind(profile.role.as_str())
            .bind(to_millis(profile.created_at))
            .execute(self.pool())
            .await?;
        info!("[STORE] Created profile {}", profile.id);
        Ok(())
    }

    async fn fetch_profile(&self, id: &str) -> StoreResult<Option<Profile>> {
        let row = sqlx::query(&format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn fetch_profiles(&self, ids: &[String]) -> StoreResult<Vec<Profile>> {
        let mut profiles = Vec::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!("SELECT {} FROM profiles WHERE id IN ({})", PROFILE_COLUMNS, placeholders(chunk.len()));
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_str());
            }
            for row in query.fetch_all(self.pool()).await? {
                profiles.push(profile_from_row(&row)?);
            }
        }
        Ok(profiles)
    }

    async fn update_contact_privacy(&self, id: &str, setting: ContactPrivacy) -> StoreResult<bool> {
        let res = sqlx::query("UPDATE profiles SET contact_privacy = ? WHERE id = ?")
            .bind(setting.as_str())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

impl SqliteStore {
    async fn load_participants(&self, thread_ids: &[String]) -> StoreResult<HashMap<String, Vec<ThreadMember>>> {
        let mut members: HashMap<String, Vec<ThreadMember>> = HashMap::new();
        for chunk in thread_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT thread_id, user_id, joined_at FROM thread_participants WHERE thread_id IN ({}) ORDER BY joined_at ASC, rowid ASC",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_str());
            }
            for row in query.fetch_all(self.pool()).await? {
                let thread_id: String = row.try_get("thread_id")?;
                members.entry(thread_id).or_default().push(ThreadMember {
                    user_id: row.try_get("user_id")?,
                    joined_at: from_millis(row.try_get("joined_at")?, "thread_participants")?,
                });
            }
        }
        Ok(members)
    }

    async fn threads_from_rows(&self, rows: Vec<SqliteRow>) -> StoreResult<Vec<Thread>> {
        let ids = rows
            .iter()
            .map(|r| r.try_get::<String, _>("id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut members = self.load_participants(&ids).await?;
        rows.iter()
            .map(|row| -> StoreResult<Thread> {
                let id: String = row.try_get("id")?;
                Ok(Thread {
                    participants: members.remove(&id).unwrap_or_default(),
                    name: row.try_get("name")?,
                    created_by: row.try_get("created_by")?,
                    created_at: from_millis(row.try_get("created_at")?, "threads")?,
                    id,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ThreadStore for SqliteStore {
    async fn insert_thread(&self, thread: &Thread) -> StoreResult<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("INSERT INTO threads (id, name, created_by, created_at) VALUES (?, ?, ?, ?)")
            .bind(&thread.id)
            .bind(&thread.name)
            .bind(&thread.created_by)
            .bind(to_millis(thread.created_at))
            .execute(&mut *tx)
            .await?;
        for member in &thread.participants {
            sqlx::query("INSERT OR IGNORE INTO thread_participants (thread_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(&thread.id)
                .bind(&member.user_id)
                .bind(to_millis(member.joined_at))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!("[STORE] Thread {} created with {} participants", thread.id, thread.participants.len());
        Ok(())
    }

    async fn fetch_thread(&self, id: &str) -> StoreResult<Option<Thread>> {
        let rows = sqlx::query("SELECT id, name, created_by, created_at FROM threads WHERE id = ?")
            .bind(id)
            .fetch_all(self.pool())
            .await?;
        Ok(self.threads_from_rows(rows).await?.into_iter().next())
    }

    async fn fetch_threads_for(&self, user_id: &str) -> StoreResult<Vec<Thread>> {
        let rows = sqlx::query(
            "SELECT t.id, t.name, t.created_by, t.created_at FROM threads t JOIN thread_participants p ON t.id = p.thread_id WHERE p.user_id = ? ORDER BY t.created_at ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        self.threads_from_rows(rows).await
    }

    async fn add_participant(&self, thread_id: &str, member: &ThreadMember, notice: &MessageRow) -> StoreResult<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("INSERT OR IGNORE INTO thread_participants (thread_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(thread_id)
            .bind(&member.user_id)
            .bind(to_millis(member.joined_at))
            .execute(&mut *tx)
            .await?;
        insert_message_query(notice).execute(&mut *tx).await?;
        tx.commit().await?;
        info!("[STORE] {} joined thread {}", member.user_id, thread_id);
        Ok(())
    }

    async fn remove_participant(&self, thread_id: &str, user_id: &str, notice: &MessageRow) -> StoreResult<bool> {
        let mut tx = self.pool().begin().await?;
        let res = sqlx::query("DELETE FROM thread_participants WHERE thread_id = ? AND user_id = ?")
            .bind(thread_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        insert_message_query(notice).execute(&mut *tx).await?;
        tx.commit().await?;
        info!("[STORE] {} left thread {}", user_id, thread_id);
        Ok(true)
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, message: &MessageRow) -> StoreResult<()> {
        insert_message_query(message).execute(self.pool()).await?;
        debug!("[STORE] Message {} stored from {}", message.id, message.sender_id);
        Ok(())
    }

    async fn fetch_direct_messages(&self, viewer_id: &str) -> StoreResult<Vec<MessageRow>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE thread_id IS NULL AND (sender_id = ? OR receiver_id = ?) ORDER BY created_at ASC, rowid ASC",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(viewer_id)
            .bind(viewer_id)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn fetch_thread_messages(&self, thread_ids: &[String]) -> StoreResult<Vec<MessageRow>> {
        let mut messages = Vec::new();
        for chunk in thread_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT {} FROM messages WHERE thread_id IN ({}) ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS,
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_str());
            }
            for row in query.fetch_all(self.pool()).await? {
                messages.push(message_from_row(&row)?);
            }
        }
        // Stable, so rows of one chunk keep their rowid order on equal timestamps.
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn mark_messages_read(&self, ids: &[String], at: DateTime<Utc>) -> StoreResult<u64> {
        let mut marked = 0;
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "UPDATE messages SET read_at = ? WHERE read_at IS NULL AND system_message_type IS NULL AND id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql).bind(to_millis(at));
            for id in chunk {
                query = query.bind(id.as_str());
            }
            marked += query.execute(self.pool()).await?.rows_affected();
        }
        debug!("[STORE] Marked {} messages read", marked);
        Ok(marked)
    }
}

#[async_trait]
impl TypingStore for SqliteStore {
    async fn upsert_typing(&self, status: &TypingStatus) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO typing_status (user_id, conversation_id, started_at) VALUES (?, ?, ?) ON CONFLICT(user_id, conversation_id) DO UPDATE SET started_at = excluded.started_at",
        )
        .bind(&status.user_id)
        .bind(&status.conversation_id)
        .bind(to_millis(status.started_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete_typing(&self, user_id: &str, conversation_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM typing_status WHERE user_id = ? AND conversation_id = ?")
            .bind(user_id)
            .bind(conversation_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn fetch_typing(&self, conversation_ids: &[String]) -> StoreResult<Vec<TypingStatus>> {
        let mut statuses = Vec::new();
        for chunk in conversation_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT user_id, conversation_id, started_at FROM typing_status WHERE conversation_id IN ({}) ORDER BY started_at ASC, rowid ASC",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_str());
            }
            for row in query.fetch_all(self.pool()).await? {
                statuses.push(TypingStatus {
                    user_id: row.try_get("user_id")?,
                    conversation_id: row.try_get("conversation_id")?,
                    started_at: from_millis(row.try_get("started_at")?, "typing_status")?,
                });
            }
        }
        statuses.sort_by_key(|t| t.started_at);
        Ok(statuses)
    }
}
