use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::client::models::{build_message_views, ConversationView, InboxSnapshot, MessageView, ANONYMOUS_NAME};
use crate::common::{
    direct_channel_id, is_valid_identifier, new_identifier, require_identifier, thread_channel_id, ConversationKey,
    MessageRow, MessageTarget, ServiceError, ServiceResult, SystemMessageType, Thread, ThreadMember, TypingStatus,
};
use crate::server::config::AppConfig;
use crate::server::store::Store;

/// Outgoing message as composed by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDraft {
    pub text: String,
    pub image_url: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    fn has_attachment(&self) -> bool {
        self.image_url.is_some() || self.file_url.is_some()
    }
}

/// Messaging operations over an injected store. Holds no state between calls.
pub struct InboxService<S: Store + ?Sized> {
    store: Arc<S>,
    config: AppConfig,
}

impl<S: Store + ?Sized> InboxService<S> {
    pub fn new(store: Arc<S>, config: AppConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Conversation list of `viewer_id`, newest first.
    pub async fn load_inbox(&self, viewer_id: &str) -> ServiceResult<Vec<ConversationView>> {
        require_identifier(viewer_id)?;

        let direct_messages = self.store.fetch_direct_messages(viewer_id).await?;
        let threads = self.store.fetch_threads_for(viewer_id).await?;
        let thread_ids: Vec<String> = threads.iter().map(|t| t.id.clone()).collect();
        let thread_messages = self.store.fetch_thread_messages(&thread_ids).await?;

        let mut seen = HashSet::new();
        let counterparts: Vec<String> = direct_messages
            .iter()
            .filter_map(|m| match m.conversation_key(viewer_id) {
                ConversationKey::Direct { user_id } => Some(user_id),
                ConversationKey::Thread { .. } => None,
            })
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let mut profile_ids = counterparts.clone();
        for member in threads.iter().flat_map(|t| t.participants.iter()) {
            if seen.insert(member.user_id.clone()) {
                profile_ids.push(member.user_id.clone());
            }
        }
        let profiles: HashMap<String, _> = self
            .store
            .fetch_profiles(&profile_ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let mut connected = HashSet::new();
        for counterpart in &counterparts {
            if self.is_connected(viewer_id, counterpart).await {
                connected.insert(counterpart.clone());
            }
        }

        let channels: Vec<String> = counterparts
            .iter()
            .map(|c| direct_channel_id(viewer_id, c))
            .chain(thread_ids.iter().map(|t| thread_channel_id(t)))
            .collect();
        let typing = self.store.fetch_typing(&channels).await?;

        let inbox = InboxSnapshot {
            direct_messages,
            threads,
            thread_messages,
            profiles,
            connected,
            typing,
        }
        .into_conversations(viewer_id);
        debug!("[INBOX] Loaded {} conversations for {}", inbox.len(), viewer_id);
        Ok(inbox)
    }

    /// Lookup failures count as "not connected".
    async fn is_connected(&self, viewer_id: &str, other_id: &str) -> bool {
        if !is_valid_identifier(other_id) {
            return false;
        }
        match self.store.connection_exists(viewer_id, other_id).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!("[INBOX] Connection lookup failed for {} <-> {}: {}", viewer_id, other_id, e);
                false
            }
        }
    }

    async fn require_membership(&self, user_id: &str, thread_id: &str) -> ServiceResult<Thread> {
        require_identifier(thread_id)?;
        let thread = self
            .store
            .fetch_thread(thread_id)
            .await?
            .ok_or_else(|| ServiceError::ThreadNotFound(thread_id.to_string()))?;
        if !thread.has_member(user_id) {
            return Err(ServiceError::NotParticipant {
                user_id: user_id.to_string(),
                thread_id: thread_id.to_string(),
            });
        }
        Ok(thread)
    }

    async fn conversation_rows(&self, viewer_id: &str, key: &ConversationKey) -> ServiceResult<Vec<MessageRow>> {
        require_identifier(viewer_id)?;
        match key {
            ConversationKey::Direct { user_id } => {
                require_identifier(user_id)?;
                let rows = self.store.fetch_direct_messages(viewer_id).await?;
                Ok(rows.into_iter().filter(|m| &m.conversation_key(viewer_id) == key).collect())
            }
            ConversationKey::Thread { thread_id } => {
                self.require_membership(viewer_id, thread_id).await?;
                Ok(self.store.fetch_thread_messages(&[thread_id.clone()]).await?)
            }
        }
    }

    /// Messages of one conversation as the viewer sees them, oldest first.
    pub async fn load_messages(&self, viewer_id: &str, key: &ConversationKey) -> ServiceResult<Vec<MessageView>> {
        let rows = self.conversation_rows(viewer_id, key).await?;
        Ok(build_message_views(&rows, viewer_id))
    }

    pub async fn send_message(&self, viewer_id: &str, key: &ConversationKey, draft: MessageDraft) -> ServiceResult<MessageRow> {
        require_identifier(viewer_id)?;
        if draft.text.trim().is_empty() && !draft.has_attachment() {
            return Err(ServiceError::EmptyMessage);
        }
        if draft.text.chars().count() > self.config.max_message_length {
            return Err(ServiceError::MessageTooLong { max: self.config.max_message_length });
        }

        let target = match key {
            ConversationKey::Direct { user_id } => {
                require_identifier(user_id)?;
                MessageTarget::Direct { receiver_id: user_id.clone() }
            }
            ConversationKey::Thread { thread_id } => {
                self.require_membership(viewer_id, thread_id).await?;
                MessageTarget::Thread { thread_id: thread_id.clone() }
            }
        };

        let message = MessageRow {
            id: new_identifier(),
            sender_id: viewer_id.to_string(),
            target,
            text: draft.text,
            created_at: Utc::now(),
            read_at: None,
            image_url: draft.image_url,
            file_url: draft.file_url,
            file_name: draft.file_name,
            system_message_type: None,
        };
        self.store.insert_message(&message).await?;
        info!("[MSG] Message {} sent by {}", message.id, viewer_id);

        if let Err(e) = self.store.delete_typing(viewer_id, &key.channel_id(viewer_id)).await {
            warn!("[MSG] Could not clear typing status of {}: {}", viewer_id, e);
        }
        Ok(message)
    }

    /// Marks every incoming unread message of the conversation read. Returns how many changed.
    pub async fn mark_conversation_read(&self, viewer_id: &str, key: &ConversationKey) -> ServiceResult<u64> {
        let unread: Vec<String> = self
            .conversation_rows(viewer_id, key)
            .await?
            .into_iter()
            .filter(|m| m.is_unread_for(viewer_id))
            .map(|m| m.id)
            .collect();
        if unread.is_empty() {
            return Ok(0);
        }
        let marked = self.store.mark_messages_read(&unread, Utc::now()).await?;
        debug!("[MSG] {} marked {} messages read", viewer_id, marked);
        Ok(marked)
    }

    async fn require_conversation_access(&self, viewer_id: &str, key: &ConversationKey) -> ServiceResult<()> {
        require_identifier(viewer_id)?;
        match key {
            ConversationKey::Direct { user_id } => require_identifier(user_id),
            ConversationKey::Thread { thread_id } => self.require_membership(viewer_id, thread_id).await.map(|_| ()),
        }
    }

    pub async fn start_typing(&self, viewer_id: &str, key: &ConversationKey) -> ServiceResult<()> {
        self.require_conversation_access(viewer_id, key).await?;
        let status = TypingStatus {
            user_id: viewer_id.to_string(),
            conversation_id: key.channel_id(viewer_id),
            started_at: Utc::now(),
        };
        self.store.upsert_typing(&status).await?;
        Ok(())
    }

    pub async fn stop_typing(&self, viewer_id: &str, key: &ConversationKey) -> ServiceResult<()> {
        self.require_conversation_access(viewer_id, key).await?;
        self.store.delete_typing(viewer_id, &key.channel_id(viewer_id)).await?;
        Ok(())
    }

    /// Creates a thread with the creator as first member, followed by `participant_ids`
    /// in the given order (duplicates dropped).
    pub async fn create_thread(&self, creator_id: &str, name: Option<&str>, participant_ids: &[String]) -> ServiceResult<Thread> {
        require_identifier(creator_id)?;
        for id in participant_ids {
            require_identifier(id)?;
        }

        let now = Utc::now();
        let mut seen = HashSet::new();
        let participants: Vec<ThreadMember> = std::iter::once(creator_id)
            .chain(participant_ids.iter().map(String::as_str))
            .filter(|id| seen.insert(id.to_string()))
            .map(|id| ThreadMember { user_id: id.to_string(), joined_at: now })
            .collect();

        let thread = Thread {
            id: new_identifier(),
            name: name.filter(|n| !n.trim().is_empty()).map(str::to_string),
            created_by: creator_id.to_string(),
            created_at: now,
            participants,
        };
        self.store.insert_thread(&thread).await?;
        info!("[THREAD] {} created thread {}", creator_id, thread.id);
        Ok(thread)
    }

    /// Adds `user_id` to a thread the actor belongs to. `None` when already a member.
    pub async fn add_participant(&self, actor_id: &str, thread_id: &str, user_id: &str) -> ServiceResult<Option<MessageRow>> {
        require_identifier(actor_id)?;
        require_identifier(user_id)?;
        let thread = self.require_membership(actor_id, thread_id).await?;
        if thread.has_member(user_id) {
            return Ok(None);
        }
        let member = ThreadMember { user_id: user_id.to_string(), joined_at: Utc::now() };
        let notice = self.system_notice(thread_id, user_id, SystemMessageType::UserJoined).await?;
        self.store.add_participant(thread_id, &member, &notice).await?;
        info!("[THREAD] {} added {} to {}", actor_id, user_id, thread_id);
        Ok(Some(notice))
    }

    /// Removes the user and records the `user_left` notice together.
    pub async fn leave_thread(&self, user_id: &str, thread_id: &str) -> ServiceResult<MessageRow> {
        require_identifier(user_id)?;
        self.require_membership(user_id, thread_id).await?;
        let notice = self.system_notice(thread_id, user_id, SystemMessageType::UserLeft).await?;
        if !self.store.remove_participant(thread_id, user_id, &notice).await? {
            return Err(ServiceError::NotParticipant {
                user_id: user_id.to_string(),
                thread_id: thread_id.to_string(),
            });
        }
        if let Err(e) = self.store.delete_typing(user_id, &thread_channel_id(thread_id)).await {
            warn!("[THREAD] Could not clear typing status of {}: {}", user_id, e);
        }
        info!("[THREAD] {} left {}", user_id, thread_id);
        Ok(notice)
    }

    /// Builds, without storing, the system message announcing `kind` for `user_id`.
    async fn system_notice(&self, thread_id: &str, user_id: &str, kind: SystemMessageType) -> ServiceResult<MessageRow> {
        let name = self
            .store
            .fetch_profile(user_id)
            .await?
            .map(|p| p.full_name())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string());
        let text = match kind {
            SystemMessageType::UserJoined => format!("{} joined the conversation", name),
            SystemMessageType::UserLeft => format!("{} left the conversation", name),
        };
        Ok(MessageRow {
            id: new_identifier(),
            sender_id: user_id.to_string(),
            target: MessageTarget::Thread { thread_id: thread_id.to_string() },
            text,
            created_at: Utc::now(),
            read_at: None,
            image_url: None,
            file_url: None,
            file_name: None,
            system_message_type: Some(kind),
        })
    }
}
