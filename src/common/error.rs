use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt {table} row: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("user {actor} does not own profile {profile_id}")]
    NotOwner { actor: String, profile_id: String },
    #[error("user {user_id} is not a participant of thread {thread_id}")]
    NotParticipant { user_id: String, thread_id: String },
    #[error("profile {0} not found")]
    ProfileNotFound(String),
    #[error("thread {0} not found")]
    ThreadNotFound(String),
    #[error("message has neither text nor attachment")]
    EmptyMessage,
    #[error("message too long (max {max} chars)")]
    MessageTooLong { max: usize },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Rejects ids that are not canonical UUIDs before they reach the store.
pub fn require_identifier(id: &str) -> ServiceResult<()> {
    if crate::common::ids::is_valid_identifier(id) {
        Ok(())
    } else {
        Err(ServiceError::InvalidIdentifier(id.to_string()))
    }
}
