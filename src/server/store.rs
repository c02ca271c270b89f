// Query collaborator the services depend on, split by row family.
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{ContactPrivacy, MessageRow, Profile, StoreResult, Thread, ThreadMember, TypingStatus};

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Existence of a connection for the unordered pair (a, b).
    async fn connection_exists(&self, a: &str, b: &str) -> StoreResult<bool>;
    /// Re-inserting an existing pair, in either order, is a no-op.
    async fn insert_connection(&self, a: &str, b: &str) -> StoreResult<()>;
    async fn remove_connection(&self, a: &str, b: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()>;
    async fn fetch_profile(&self, id: &str) -> StoreResult<Option<Profile>>;
    async fn fetch_profiles(&self, ids: &[String]) -> StoreResult<Vec<Profile>>;
    /// Returns false when no such profile exists.
    async fn update_contact_privacy(&self, id: &str, setting: ContactPrivacy) -> StoreResult<bool>;
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Inserts the thread and its initial participants.
    async fn insert_thread(&self, thread: &Thread) -> StoreResult<()>;
    async fn fetch_thread(&self, id: &str) -> StoreResult<Option<Thread>>;
    /// Threads `user_id` currently belongs to, participants ordered by join time.
    async fn fetch_threads_for(&self, user_id: &str) -> StoreResult<Vec<Thread>>;
    /// Adds `member` and stores `notice` in one transaction.
    async fn add_participant(&self, thread_id: &str, member: &ThreadMember, notice: &MessageRow) -> StoreResult<()>;
    /// Removes `user_id` and stores `notice` in one transaction. Returns false, writing
    /// nothing, when the user was not a member.
    async fn remove_participant(&self, thread_id: &str, user_id: &str, notice: &MessageRow) -> StoreResult<bool>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &MessageRow) -> StoreResult<()>;
    /// 1:1 messages where `viewer_id` is sender or receiver, oldest first.
    async fn fetch_direct_messages(&self, viewer_id: &str) -> StoreResult<Vec<MessageRow>>;
    /// Messages of the given threads, oldest first.
    async fn fetch_thread_messages(&self, thread_ids: &[String]) -> StoreResult<Vec<MessageRow>>;
    /// Sets `read_at` on rows that are unread and not system messages.
    /// Returns how many rows transitioned.
    async fn mark_messages_read(&self, ids: &[String], at: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait TypingStore: Send + Sync {
    async fn upsert_typing(&self, status: &TypingStatus) -> StoreResult<()>;
    async fn delete_typing(&self, user_id: &str, conversation_id: &str) -> StoreResult<()>;
    /// Rows for the given channels ordered by `started_at`.
    async fn fetch_typing(&self, conversation_ids: &[String]) -> StoreResult<Vec<TypingStatus>>;
}

pub trait Store: ConnectionStore + ProfileStore + ThreadStore + MessageStore + TypingStore {}

impl<T> Store for T where T: ConnectionStore + ProfileStore + ThreadStore + MessageStore + TypingStore {}
