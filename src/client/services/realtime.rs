use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::client::models::{
    latest_read_receipt, sort_conversations, typing_text, ConversationParticipant, ConversationView, MessageView,
    ReadReceipt, TypingUser, ANONYMOUS_NAME,
};
use crate::common::{ConversationKey, MessageRow};

/// Change notification delivered by the realtime feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    MessageInserted(MessageRow),
    MessageRead {
        message_id: String,
        read_at: DateTime<Utc>,
    },
    TypingStarted {
        user_id: String,
        conversation_id: String,
        display_name: String,
        started_at: DateTime<Utc>,
    },
    TypingStopped {
        user_id: String,
        conversation_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Ignored,
    /// The event concerns data this state never loaded; reload it.
    RefreshNeeded,
}

fn typing_user(user_id: &str, display_name: &str) -> TypingUser {
    let name = display_name.trim();
    TypingUser {
        user_id: user_id.to_string(),
        name: if name.is_empty() { ANONYMOUS_NAME.to_string() } else { name.to_string() },
    }
}

/// Inserts or refreshes `user` in place. Returns whether the list changed.
fn upsert_typing(typing: &mut Vec<TypingUser>, user: TypingUser) -> bool {
    match typing.iter_mut().find(|t| t.user_id == user.user_id) {
        Some(existing) if *existing == user => false,
        Some(existing) => {
            *existing = user;
            true
        }
        None => {
            typing.push(user);
            true
        }
    }
}

fn remove_typing(typing: &mut Vec<TypingUser>, user_id: &str) -> bool {
    let before = typing.len();
    typing.retain(|t| t.user_id != user_id);
    typing.len() != before
}

fn outcome(changed: bool) -> EventOutcome {
    if changed {
        EventOutcome::Applied
    } else {
        EventOutcome::Ignored
    }
}

/// Conversation list kept in sync with the feed.
///
/// A message at or before a conversation's latest timestamp that the loaded view
/// already counts is not applied again, so the feed may replay rows the load saw.
#[derive(Debug, Clone)]
pub struct InboxState {
    viewer_id: String,
    conversations: Vec<ConversationView>,
}

impl InboxState {
    pub fn new(viewer_id: impl Into<String>, conversations: Vec<ConversationView>) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            conversations,
        }
    }

    pub fn conversations(&self) -> &[ConversationView] {
        &self.conversations
    }

    pub fn conversation(&self, key: &ConversationKey) -> Option<&ConversationView> {
        self.conversations.iter().find(|c| &c.key == key)
    }

    fn by_channel(&mut self, channel_id: &str) -> Option<&mut ConversationView> {
        let viewer_id = &self.viewer_id;
        self.conversations.iter_mut().find(|c| c.key.channel_id(viewer_id) == channel_id)
    }

    pub fn apply(&mut self, event: &RealtimeEvent) -> EventOutcome {
        match event {
            RealtimeEvent::MessageInserted(message) => {
                let key = message.conversation_key(&self.viewer_id);
                let Some(conversation) = self.conversations.iter_mut().find(|c| c.key == key) else {
                    debug!("[REALTIME] Message {} for unknown conversation, refresh needed", message.id);
                    return EventOutcome::RefreshNeeded;
                };
                if conversation.has_recorded(message) {
                    return EventOutcome::Ignored;
                }
                conversation.record_message(message, &self.viewer_id);
                sort_conversations(&mut self.conversations);
                EventOutcome::Applied
            }
            // Unread counts only drop when the viewer opens the conversation.
            RealtimeEvent::MessageRead { .. } => EventOutcome::Ignored,
            RealtimeEvent::TypingStarted { user_id, conversation_id, display_name, .. } => {
                if user_id == &self.viewer_id {
                    return EventOutcome::Ignored;
                }
                match self.by_channel(conversation_id) {
                    Some(c) => outcome(upsert_typing(&mut c.typing_users, typing_user(user_id, display_name))),
                    None => EventOutcome::Ignored,
                }
            }
            RealtimeEvent::TypingStopped { user_id, conversation_id } => match self.by_channel(conversation_id) {
                Some(c) => outcome(remove_typing(&mut c.typing_users, user_id)),
                None => EventOutcome::Ignored,
            },
        }
    }

    /// Resets the unread badge after the viewer opened `key`.
    pub fn clear_unread(&mut self, key: &ConversationKey) -> bool {
        match self.conversations.iter_mut().find(|c| &c.key == key) {
            Some(c) if c.unread_count > 0 => {
                c.unread_count = 0;
                true
            }
            _ => false,
        }
    }
}

/// Messages and typing indicator of the open conversation.
#[derive(Debug, Clone)]
pub struct ConversationState {
    viewer_id: String,
    key: ConversationKey,
    messages: Vec<MessageView>,
    typing_users: Vec<TypingUser>,
}

impl ConversationState {
    /// `messages` must already be ordered oldest first, as `load_messages` returns them.
    pub fn new(viewer_id: impl Into<String>, key: ConversationKey, messages: Vec<MessageView>) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            key,
            messages,
            typing_users: Vec::new(),
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn messages(&self) -> &[MessageView] {
        &self.messages
    }

    pub fn typing_users(&self) -> &[TypingUser] {
        &self.typing_users
    }

    pub fn typing_text(&self) -> Option<String> {
        let names: Vec<&str> = self.typing_users.iter().map(|t| t.name.as_str()).collect();
        typing_text(&names)
    }

    pub fn read_receipt(&self, recipient: Option<&ConversationParticipant>) -> Option<(&str, ReadReceipt)> {
        latest_read_receipt(&self.messages, recipient)
    }

    fn is_own_channel(&self, conversation_id: &str) -> bool {
        self.key.channel_id(&self.viewer_id) == conversation_id
    }

    pub fn apply(&mut self, event: &RealtimeEvent) -> EventOutcome {
        match event {
            RealtimeEvent::MessageInserted(message) => {
                if message.conversation_key(&self.viewer_id) != self.key
                    || self.messages.iter().any(|m| m.id == message.id)
                {
                    return EventOutcome::Ignored;
                }
                let at = self.messages.partition_point(|m| m.created_at <= message.created_at);
                self.messages.insert(at, MessageView::from_row(message, &self.viewer_id));
                EventOutcome::Applied
            }
            RealtimeEvent::MessageRead { message_id, read_at } => {
                match self.messages.iter_mut().find(|m| &m.id == message_id) {
                    Some(m) => outcome(m.mark_read(*read_at)),
                    None => EventOutcome::Ignored,
                }
            }
            RealtimeEvent::TypingStarted { user_id, conversation_id, display_name, .. } => {
                if user_id == &self.viewer_id || !self.is_own_channel(conversation_id) {
                    return EventOutcome::Ignored;
                }
                outcome(upsert_typing(&mut self.typing_users, typing_user(user_id, display_name)))
            }
            RealtimeEvent::TypingStopped { user_id, conversation_id } => {
                if !self.is_own_channel(conversation_id) {
                    return EventOutcome::Ignored;
                }
                outcome(remove_typing(&mut self.typing_users, user_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::{build_message_views, InboxSnapshot, MessageStatus};
    use crate::common::{MessageTarget, SystemMessageType};
    use chrono::Duration;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(0).unwrap() + Duration::minutes(minutes)
    }

    fn direct(id: &str, from: &str, to: &str, minutes: i64) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            sender_id: from.to_string(),
            target: MessageTarget::Direct { receiver_id: to.to_string() },
            text: format!("msg {}", id),
            created_at: at(minutes),
            read_at: None,
            image_url: None,
            file_url: None,
            file_name: None,
            system_message_type: None,
        }
    }

    fn typing_started(user: &str, channel: &str, name: &str) -> RealtimeEvent {
        RealtimeEvent::TypingStarted {
            user_id: user.to_string(),
            conversation_id: channel.to_string(),
            display_name: name.to_string(),
            started_at: Utc::now(),
        }
    }

    fn inbox() -> InboxState {
        let snapshot = InboxSnapshot {
            direct_messages: vec![direct("1", "a", "me", 1), direct("2", "b", "me", 2)],
            ..InboxSnapshot::default()
        };
        InboxState::new("me", snapshot.into_conversations("me"))
    }

    #[test]
    fn insert_moves_conversation_to_top() {
        let mut state = inbox();
        assert_eq!(state.conversations()[0].key, ConversationKey::direct("b"));

        let event = RealtimeEvent::MessageInserted(direct("3", "a", "me", 3));
        assert_eq!(state.apply(&event), EventOutcome::Applied);
        let top = &state.conversations()[0];
        assert_eq!(top.key, ConversationKey::direct("a"));
        assert_eq!(top.last_message, "msg 3");
        assert_eq!(top.unread_count, 2);

        assert_eq!(state.apply(&event), EventOutcome::Ignored);
        assert_eq!(state.conversations()[0].unread_count, 2);
    }

    #[test]
    fn replayed_snapshot_message_is_not_counted_twice() {
        let mut state = inbox();
        let a = ConversationKey::direct("a");
        assert_eq!(state.conversation(&a).unwrap().unread_count, 1);

        let replay = RealtimeEvent::MessageInserted(direct("1", "a", "me", 1));
        assert_eq!(state.apply(&replay), EventOutcome::Ignored);
        assert_eq!(state.conversation(&a).unwrap().unread_count, 1);
    }

    #[test]
    fn messages_sharing_the_latest_timestamp_are_told_apart() {
        let snapshot = InboxSnapshot {
            direct_messages: vec![direct("1", "a", "me", 5), direct("2", "a", "me", 5)],
            ..InboxSnapshot::default()
        };
        let mut state = InboxState::new("me", snapshot.into_conversations("me"));
        let a = ConversationKey::direct("a");

        let replay = RealtimeEvent::MessageInserted(direct("1", "a", "me", 5));
        assert_eq!(state.apply(&replay), EventOutcome::Ignored);
        let sibling = RealtimeEvent::MessageInserted(direct("3", "a", "me", 5));
        assert_eq!(state.apply(&sibling), EventOutcome::Applied);
        assert_eq!(state.apply(&sibling), EventOutcome::Ignored);

        let stale = RealtimeEvent::MessageInserted(direct("0", "a", "me", 4));
        assert_eq!(state.apply(&stale), EventOutcome::Ignored);

        let a_view = state.conversation(&a).unwrap();
        assert_eq!(a_view.unread_count, 3);
        assert_eq!(a_view.last_message, "msg 3");
    }

    #[test]
    fn insert_for_unknown_conversation_requests_refresh() {
        let mut state = inbox();
        let event = RealtimeEvent::MessageInserted(direct("9", "stranger", "me", 9));
        assert_eq!(state.apply(&event), EventOutcome::RefreshNeeded);
        assert_eq!(state.conversations().len(), 2);
    }

    #[test]
    fn inbox_typing_updates_in_place_and_ignores_viewer() {
        let mut state = inbox();
        let channel = ConversationKey::direct("a").channel_id("me");
        assert_eq!(state.apply(&typing_started("me", &channel, "Me")), EventOutcome::Ignored);
        assert_eq!(state.apply(&typing_started("a", &channel, "Ann")), EventOutcome::Applied);
        assert_eq!(state.apply(&typing_started("a", &channel, "Ann Lee")), EventOutcome::Applied);

        let a = state.conversation(&ConversationKey::direct("a")).unwrap();
        assert_eq!(a.typing_users.len(), 1);
        assert_eq!(a.typing_text().as_deref(), Some("Ann Lee is typing..."));

        let stop = RealtimeEvent::TypingStopped { user_id: "a".to_string(), conversation_id: channel };
        assert_eq!(state.apply(&stop), EventOutcome::Applied);
        assert_eq!(state.apply(&stop), EventOutcome::Ignored);
    }

    #[test]
    fn clear_unread_resets_badge() {
        let mut state = inbox();
        let key = ConversationKey::direct("a");
        assert!(state.clear_unread(&key));
        assert!(!state.clear_unread(&key));
        assert_eq!(state.conversation(&key).unwrap().unread_count, 0);
    }

    #[test]
    fn conversation_inserts_by_timestamp_and_dedupes() {
        let rows = vec![direct("1", "a", "me", 1), direct("3", "me", "a", 3)];
        let mut state = ConversationState::new("me", ConversationKey::direct("a"), build_message_views(&rows, "me"));

        assert_eq!(state.apply(&RealtimeEvent::MessageInserted(direct("2", "a", "me", 2))), EventOutcome::Applied);
        assert_eq!(state.apply(&RealtimeEvent::MessageInserted(direct("2", "a", "me", 2))), EventOutcome::Ignored);
        assert_eq!(state.apply(&RealtimeEvent::MessageInserted(direct("x", "b", "me", 2))), EventOutcome::Ignored);

        let ids: Vec<&str> = state.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn read_events_are_one_way() {
        let rows = vec![direct("1", "me", "a", 1)];
        let mut state = ConversationState::new("me", ConversationKey::direct("a"), build_message_views(&rows, "me"));
        assert_eq!(state.read_receipt(None), Some(("1", ReadReceipt::Sent)));

        let first = RealtimeEvent::MessageRead { message_id: "1".to_string(), read_at: at(5) };
        let second = RealtimeEvent::MessageRead { message_id: "1".to_string(), read_at: at(9) };
        assert_eq!(state.apply(&first), EventOutcome::Applied);
        assert_eq!(state.apply(&second), EventOutcome::Ignored);
        assert_eq!(state.messages()[0].read_at, Some(at(5)));
        assert_eq!(state.messages()[0].status, MessageStatus::Read);

        let missing = RealtimeEvent::MessageRead { message_id: "nope".to_string(), read_at: at(5) };
        assert_eq!(state.apply(&missing), EventOutcome::Ignored);
    }

    #[test]
    fn system_messages_ignore_read_events() {
        let mut notice = direct("s", "a", "me", 1);
        notice.target = MessageTarget::Thread { thread_id: "t".to_string() };
        notice.system_message_type = Some(SystemMessageType::UserJoined);
        let mut state = ConversationState::new("me", ConversationKey::thread("t"), build_message_views(&[notice], "me"));
        let read = RealtimeEvent::MessageRead { message_id: "s".to_string(), read_at: at(2) };
        assert_eq!(state.apply(&read), EventOutcome::Ignored);
        assert_eq!(state.messages()[0].read_at, None);
    }

    #[test]
    fn conversation_typing_text_lists_other_typists() {
        let mut state = ConversationState::new("me", ConversationKey::thread("t"), Vec::new());
        let channel = ConversationKey::thread("t").channel_id("me");
        state.apply(&typing_started("a", &channel, "Ann"));
        state.apply(&typing_started("b", &channel, ""));
        state.apply(&typing_started("c", "thread:other", "Cy"));
        assert_eq!(state.typing_text().as_deref(), Some("Ann and Someone are typing..."));
    }
}
