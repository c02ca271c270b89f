use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::models::quick_prompt::QuickPrompt;
use crate::client::models::typing::typing_text;
use crate::common::{
    full_name, initials, ConnectionType, ConversationKey, MessageRow, MessageTarget, Profile, Thread, TypingStatus,
};

pub const GROUP_CHAT_FALLBACK: &str = "Group Chat";
pub const UNKNOWN_USER: &str = "Unknown user";
pub const ANONYMOUS_NAME: &str = "Someone";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationParticipant {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ConversationParticipant {
    /// Participant known only by id (profile missing or unreadable).
    pub fn unknown(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            first_name: None,
            last_name: None,
            avatar_url: None,
        }
    }

    pub fn full_name(&self) -> String {
        full_name(self.first_name.as_deref(), self.last_name.as_deref())
    }

    pub fn initials(&self) -> String {
        initials(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

impl From<&Profile> for ConversationParticipant {
    fn from(profile: &Profile) -> Self {
        Self {
            user_id: profile.id.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingUser {
    pub user_id: String,
    pub name: String,
}

/// Name shown for a group thread.
///
/// A non-blank custom name wins verbatim. Otherwise the first participant's full
/// name followed by " +N" for the N other participants.
pub fn group_display_name(custom_name: Option<&str>, participants: &[ConversationParticipant]) -> String {
    if let Some(name) = custom_name {
        if !name.trim().is_empty() {
            return name.to_string();
        }
    }
    match participants.split_first() {
        None => GROUP_CHAT_FALLBACK.to_string(),
        Some((first, rest)) if rest.is_empty() => first.full_name(),
        Some((first, rest)) => format!("{} +{}", first.full_name(), rest.len()),
    }
}

/// Inbox preview of a message.
pub fn last_message_preview(message: &MessageRow) -> String {
    if !message.text.trim().is_empty() {
        message.text.clone()
    } else if message.image_url.is_some() {
        "Sent an image".to_string()
    } else if message.file_url.is_some() {
        "Sent a file".to_string()
    } else {
        String::new()
    }
}

/// One row of the inbox. Rebuilt on every load, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationView {
    pub key: ConversationKey,
    pub name: String,
    pub avatar_url: Option<String>,
    pub connection_type: ConnectionType,
    pub participants: Vec<ConversationParticipant>,
    pub last_message: String,
    pub last_message_date: Option<DateTime<Utc>>,
    pub unread_count: usize,
    pub typing_users: Vec<TypingUser>,
    pub is_connected: bool,
    /// Ids of the messages stamped exactly `last_message_date`.
    #[serde(skip)]
    pub(crate) latest_message_ids: Vec<String>,
}

impl ConversationView {
    pub fn is_group(&self) -> bool {
        matches!(self.key, ConversationKey::Thread { .. })
    }

    pub fn typing_names(&self) -> Vec<&str> {
        self.typing_users.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn typing_text(&self) -> Option<String> {
        typing_text(&self.typing_names())
    }

    pub fn quick_prompt(&self) -> QuickPrompt {
        QuickPrompt::for_connection(self.connection_type)
    }

    /// Counterpart of a 1:1 conversation.
    pub fn recipient(&self) -> Option<&ConversationParticipant> {
        match self.key {
            ConversationKey::Direct { .. } => self.participants.first(),
            ConversationKey::Thread { .. } => None,
        }
    }

    /// True when `message` is already reflected in this view: it is older than the
    /// latest message, or one of the messages sharing the latest timestamp.
    pub(crate) fn has_recorded(&self, message: &MessageRow) -> bool {
        match self.last_message_date {
            Some(date) if message.created_at < date => true,
            Some(date) if message.created_at == date => self.latest_message_ids.contains(&message.id),
            _ => false,
        }
    }

    pub(crate) fn record_message(&mut self, message: &MessageRow, viewer_id: &str) {
        match self.last_message_date {
            Some(date) if message.created_at < date => {}
            Some(date) if message.created_at == date => {
                self.last_message = last_message_preview(message);
                self.latest_message_ids.push(message.id.clone());
            }
            _ => {
                self.last_message = last_message_preview(message);
                self.last_message_date = Some(message.created_at);
                self.latest_message_ids = vec![message.id.clone()];
            }
        }
        if message.is_unread_for(viewer_id) {
            self.unread_count += 1;
        }
    }
}

/// Newest conversation first, conversations without messages last.
pub fn sort_conversations(conversations: &mut [ConversationView]) {
    conversations.sort_by(|a, b| b.last_message_date.cmp(&a.last_message_date));
}

/// Everything the inbox derivation reads, fetched up front by the service.
#[derive(Debug, Clone, Default)]
pub struct InboxSnapshot {
    pub direct_messages: Vec<MessageRow>,
    pub threads: Vec<Thread>,
    pub thread_messages: Vec<MessageRow>,
    pub profiles: HashMap<String, Profile>,
    /// Counterparts with a confirmed connection to the viewer.
    pub connected: HashSet<String>,
    pub typing: Vec<TypingStatus>,
}

impl InboxSnapshot {
    fn participant(&self, user_id: &str) -> ConversationParticipant {
        self.profiles
            .get(user_id)
            .map(ConversationParticipant::from)
            .unwrap_or_else(|| ConversationParticipant::unknown(user_id))
    }

    fn typing_users(&self, channel_id: &str, viewer_id: &str) -> Vec<TypingUser> {
        self.typing
            .iter()
            .filter(|t| t.conversation_id == channel_id && t.user_id != viewer_id)
            .map(|t| {
                let name = self.profiles.get(&t.user_id).map(Profile::full_name).unwrap_or_default();
                TypingUser {
                    user_id: t.user_id.clone(),
                    name: if name.is_empty() { ANONYMOUS_NAME.to_string() } else { name },
                }
            })
            .collect()
    }

    fn direct_conversation(&self, user_id: &str, viewer_id: &str) -> ConversationView {
        let participant = self.participant(user_id);
        let name = participant.full_name();
        let key = ConversationKey::direct(user_id);
        ConversationView {
            name: if name.is_empty() { UNKNOWN_USER.to_string() } else { name },
            avatar_url: participant.avatar_url.clone(),
            connection_type: self
                .profiles
                .get(user_id)
                .map(|p| ConnectionType::from(p.role))
                .unwrap_or(ConnectionType::Peer),
            typing_users: self.typing_users(&key.channel_id(viewer_id), viewer_id),
            is_connected: self.connected.contains(user_id),
            participants: vec![participant],
            last_message: String::new(),
            last_message_date: None,
            unread_count: 0,
            latest_message_ids: Vec::new(),
            key,
        }
    }

    fn thread_conversation(&self, thread: &Thread, viewer_id: &str) -> ConversationView {
        let participants: Vec<ConversationParticipant> = thread
            .participants
            .iter()
            .filter(|m| m.user_id != viewer_id)
            .map(|m| self.participant(&m.user_id))
            .collect();
        let key = ConversationKey::thread(thread.id.clone());
        ConversationView {
            name: group_display_name(thread.name.as_deref(), &participants),
            avatar_url: None,
            connection_type: ConnectionType::Peer,
            typing_users: self.typing_users(&key.channel_id(viewer_id), viewer_id),
            is_connected: true,
            participants,
            last_message: String::new(),
            last_message_date: None,
            unread_count: 0,
            latest_message_ids: Vec::new(),
            key,
        }
    }

    /// Materialise the inbox of `viewer_id`.
    pub fn into_conversations(self, viewer_id: &str) -> Vec<ConversationView> {
        let mut conversations: Vec<ConversationView> = Vec::new();
        let mut index: HashMap<ConversationKey, usize> = HashMap::new();

        for message in &self.direct_messages {
            if !matches!(message.target, MessageTarget::Direct { .. }) {
                continue;
            }
            let key = message.conversation_key(viewer_id);
            let slot = match index.get(&key).copied() {
                Some(slot) => slot,
                None => {
                    let ConversationKey::Direct { user_id } = &key else { continue };
                    conversations.push(self.direct_conversation(user_id, viewer_id));
                    index.insert(key.clone(), conversations.len() - 1);
                    conversations.len() - 1
                }
            };
            conversations[slot].record_message(message, viewer_id);
        }

        for thread in &self.threads {
            let key = ConversationKey::thread(thread.id.clone());
            if index.contains_key(&key) {
                continue;
            }
            conversations.push(self.thread_conversation(thread, viewer_id));
            index.insert(key, conversations.len() - 1);
        }

        for message in &self.thread_messages {
            if let Some(slot) = index.get(&message.conversation_key(viewer_id)) {
                conversations[*slot].record_message(message, viewer_id);
            }
        }

        sort_conversations(&mut conversations);
        conversations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ProfileRole, ThreadMember, ContactPrivacy, SystemMessageType};
    use chrono::Duration;

    fn participant(first: Option<&str>, last: Option<&str>) -> ConversationParticipant {
        ConversationParticipant {
            user_id: "u".to_string(),
            first_name: first.map(str::to_string),
            last_name: last.map(str::to_string),
            avatar_url: None,
        }
    }

    fn profile(id: &str, first: &str, last: &str, role: ProfileRole) -> Profile {
        Profile {
            id: id.to_string(),
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            avatar_url: None,
            email: None,
            phone: None,
            contact_privacy: ContactPrivacy::Connections,
            role,
            created_at: Utc::now(),
        }
    }

    fn direct(id: &str, from: &str, to: &str, minutes: i64) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            sender_id: from.to_string(),
            target: MessageTarget::Direct { receiver_id: to.to_string() },
            text: format!("msg {}", id),
            created_at: DateTime::<Utc>::from_timestamp_millis(0).unwrap() + Duration::minutes(minutes),
            read_at: None,
            image_url: None,
            file_url: None,
            file_name: None,
            system_message_type: None,
        }
    }

    #[test]
    fn custom_group_name_wins() {
        let people = vec![participant(Some("Jo"), Some("Lin"))];
        assert_eq!(group_display_name(Some("Varsity Crew"), &people), "Varsity Crew");
        assert_eq!(group_display_name(Some("Varsity Crew"), &[]), "Varsity Crew");
    }

    #[test]
    fn group_name_from_first_participant() {
        let people = vec![
            participant(Some("Jo"), Some("Lin")),
            participant(Some("Amy"), None),
            participant(None, None),
        ];
        assert_eq!(group_display_name(None, &people), "Jo Lin +2");
        assert_eq!(group_display_name(Some("   "), &people), "Jo Lin +2");
        assert_eq!(group_display_name(None, &people[..1]), "Jo Lin");
        assert_eq!(group_display_name(None, &[participant(None, Some("Lin"))]), "Lin");
    }

    #[test]
    fn empty_group_uses_fallback_label() {
        assert_eq!(group_display_name(None, &[]), GROUP_CHAT_FALLBACK);
        assert_eq!(group_display_name(Some(""), &[]), "Group Chat");
    }

    #[test]
    fn preview_falls_back_to_attachment_labels() {
        let mut row = direct("1", "a", "b", 0);
        row.text = String::new();
        row.image_url = Some("https://cdn/img.png".to_string());
        assert_eq!(last_message_preview(&row), "Sent an image");
        row.image_url = None;
        row.file_url = Some("https://cdn/resume.pdf".to_string());
        assert_eq!(last_message_preview(&row), "Sent a file");
    }

    #[test]
    fn inbox_groups_direct_messages_by_counterpart() {
        let mut snapshot = InboxSnapshot::default();
        snapshot.profiles.insert("coach".to_string(), profile("coach", "Dana", "Cole", ProfileRole::Mentor));
        snapshot.profiles.insert("hr".to_string(), profile("hr", "Hal", "Ruiz", ProfileRole::Employer));
        snapshot.connected.insert("coach".to_string());
        snapshot.direct_messages = vec![
            direct("1", "coach", "me", 1),
            direct("2", "me", "coach", 2),
            direct("3", "hr", "me", 3),
            direct("4", "coach", "me", 4),
        ];
        snapshot.typing.push(TypingStatus {
            user_id: "hr".to_string(),
            conversation_id: ConversationKey::direct("hr").channel_id("me"),
            started_at: Utc::now(),
        });

        let inbox = snapshot.into_conversations("me");
        assert_eq!(inbox.len(), 2);

        let coach = &inbox[0];
        assert_eq!(coach.name, "Dana Cole");
        assert_eq!(coach.connection_type, ConnectionType::Mentor);
        assert_eq!(coach.last_message, "msg 4");
        assert_eq!(coach.unread_count, 2);
        assert!(coach.is_connected);
        assert_eq!(coach.quick_prompt(), QuickPrompt::Mentorship);

        let hr = &inbox[1];
        assert_eq!(hr.connection_type, ConnectionType::Employer);
        assert!(!hr.is_connected);
        assert_eq!(hr.typing_text().as_deref(), Some("Hal Ruiz is typing..."));
    }

    #[test]
    fn threads_exclude_viewer_and_skip_system_unread() {
        let now = Utc::now();
        let mut snapshot = InboxSnapshot::default();
        snapshot.profiles.insert("jo".to_string(), profile("jo", "Jo", "Lin", ProfileRole::Athlete));
        snapshot.threads.push(Thread {
            id: "t1".to_string(),
            name: None,
            created_by: "me".to_string(),
            created_at: now,
            participants: ["me", "jo", "x", "y"]
                .iter()
                .map(|id| ThreadMember { user_id: id.to_string(), joined_at: now })
                .collect(),
        });
        let mut left = direct("s", "x", "me", 5);
        left.target = MessageTarget::Thread { thread_id: "t1".to_string() };
        left.system_message_type = Some(SystemMessageType::UserLeft);
        left.text = "x left the conversation".to_string();
        snapshot.thread_messages.push(left);

        let inbox = snapshot.into_conversations("me");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].name, "Jo Lin +2");
        assert_eq!(inbox[0].unread_count, 0);
        assert_eq!(inbox[0].last_message, "x left the conversation");
        assert!(inbox[0].is_group());
        assert_eq!(inbox[0].name.as_str(), group_display_name(None, &inbox[0].participants));
    }

    #[test]
    fn missing_profiles_degrade_to_labels() {
        let mut snapshot = InboxSnapshot::default();
        snapshot.direct_messages.push(direct("1", "ghost", "me", 1));
        snapshot.typing.push(TypingStatus {
            user_id: "ghost".to_string(),
            conversation_id: ConversationKey::direct("ghost").channel_id("me"),
            started_at: Utc::now(),
        });
        let inbox = snapshot.into_conversations("me");
        assert_eq!(inbox[0].name, UNKNOWN_USER);
        assert_eq!(inbox[0].connection_type, ConnectionType::Peer);
        assert_eq!(inbox[0].recipient().map(|p| p.initials()).as_deref(), Some("?"));
        assert_eq!(inbox[0].typing_text().as_deref(), Some("Someone is typing..."));
    }

    #[test]
    fn empty_threads_sort_last() {
        let mut snapshot = InboxSnapshot::default();
        snapshot.threads.push(Thread {
            id: "quiet".to_string(),
            name: Some("Quiet".to_string()),
            created_by: "me".to_string(),
            created_at: Utc::now(),
            participants: Vec::new(),
        });
        snapshot.direct_messages.push(direct("1", "a", "me", 1));
        let inbox = snapshot.into_conversations("me");
        assert_eq!(inbox[0].key, ConversationKey::direct("a"));
        assert_eq!(inbox[1].name, "Quiet");
        assert_eq!(inbox[1].last_message_date, None);
    }
}
