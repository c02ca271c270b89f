// Row models shared by the store, the services and the CLI
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who may see a profile's email and phone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "Option<String>", into = "String")]
pub enum ContactPrivacy {
    Public,
    Private,
    /// Visible only to the owner's connections. Any unknown setting lands here.
    #[default]
    Connections,
}

impl ContactPrivacy {
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("public") => ContactPrivacy::Public,
            Some("private") => ContactPrivacy::Private,
            _ => ContactPrivacy::Connections,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactPrivacy::Public => "public",
            ContactPrivacy::Private => "private",
            ContactPrivacy::Connections => "connections",
        }
    }
}

impl From<Option<String>> for ContactPrivacy {
    fn from(setting: Option<String>) -> Self {
        ContactPrivacy::from_setting(setting.as_deref())
    }
}

impl From<ContactPrivacy> for String {
    fn from(privacy: ContactPrivacy) -> Self {
        privacy.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "Option<String>", into = "String")]
pub enum ProfileRole {
    #[default]
    Athlete,
    Alumni,
    Mentor,
    Employer,
}

impl ProfileRole {
    pub fn from_setting(role: Option<&str>) -> Self {
        match role.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("alumni") => ProfileRole::Alumni,
            Some("mentor") => ProfileRole::Mentor,
            Some("employer") => ProfileRole::Employer,
            _ => ProfileRole::Athlete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::Athlete => "athlete",
            ProfileRole::Alumni => "alumni",
            ProfileRole::Mentor => "mentor",
            ProfileRole::Employer => "employer",
        }
    }
}

impl From<Option<String>> for ProfileRole {
    fn from(role: Option<String>) -> Self {
        ProfileRole::from_setting(role.as_deref())
    }
}

impl From<ProfileRole> for String {
    fn from(role: ProfileRole) -> Self {
        role.as_str().to_string()
    }
}

/// Relationship category of a conversation, drives the quick prompt offered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Mentor,
    Employer,
    Peer,
}

impl From<ProfileRole> for ConnectionType {
    fn from(role: ProfileRole) -> Self {
        match role {
            ProfileRole::Mentor => ConnectionType::Mentor,
            ProfileRole::Employer => ConnectionType::Employer,
            ProfileRole::Athlete | ProfileRole::Alumni => ConnectionType::Peer,
        }
    }
}

/// A user profile as stored. Contact fields are raw here; sanitise before showing them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub contact_privacy: ContactPrivacy,
    #[serde(default)]
    pub role: ProfileRole,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        full_name(self.first_name.as_deref(), self.last_name.as_deref())
    }

    pub fn initials(&self) -> String {
        initials(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

/// First and last name, trimmed and space-joined. Empty when neither is present.
pub fn full_name(first: Option<&str>, last: Option<&str>) -> String {
    [first, last]
        .iter()
        .filter_map(|part| part.map(str::trim))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Up to two uppercase initials, or "?" when no name part is usable.
pub fn initials(first: Option<&str>, last: Option<&str>) -> String {
    let letters: String = [first, last]
        .iter()
        .filter_map(|part| part.and_then(|p| p.trim().chars().next()))
        .flat_map(char::to_uppercase)
        .collect();
    if letters.is_empty() {
        "?".to_string()
    } else {
        letters
    }
}

/// Unordered pair of profile ids. Stored normalised so (a, b) and (b, a) are one row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub user_a: String,
    pub user_b: String,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(a: &str, b: &str, created_at: DateTime<Utc>) -> Self {
        let (user_a, user_b) = ordered_pair(a, b);
        Self {
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            created_at,
        }
    }
}

pub fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Identifies a conversation from the point of view of one participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationKey {
    /// 1:1 conversation with `user_id`
    Direct { user_id: String },
    Thread { thread_id: String },
}

impl ConversationKey {
    pub fn direct(user_id: impl Into<String>) -> Self {
        ConversationKey::Direct { user_id: user_id.into() }
    }

    pub fn thread(thread_id: impl Into<String>) -> Self {
        ConversationKey::Thread { thread_id: thread_id.into() }
    }

    /// Id used for the typing-status rows of this conversation.
    pub fn channel_id(&self, viewer_id: &str) -> String {
        match self {
            ConversationKey::Direct { user_id } => direct_channel_id(viewer_id, user_id),
            ConversationKey::Thread { thread_id } => thread_channel_id(thread_id),
        }
    }
}

pub fn direct_channel_id(a: &str, b: &str) -> String {
    let (lo, hi) = ordered_pair(a, b);
    format!("direct:{}:{}", lo, hi)
}

pub fn thread_channel_id(thread_id: &str) -> String {
    format!("thread:{}", thread_id)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageTarget {
    Direct { receiver_id: String },
    Thread { thread_id: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageType {
    UserLeft,
    UserJoined,
}

impl SystemMessageType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user_left" => Some(SystemMessageType::UserLeft),
            "user_joined" => Some(SystemMessageType::UserJoined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemMessageType::UserLeft => "user_left",
            SystemMessageType::UserJoined => "user_joined",
        }
    }
}

/// A message as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub target: MessageTarget,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub system_message_type: Option<SystemMessageType>,
}

impl MessageRow {
    pub fn is_system_message(&self) -> bool {
        self.system_message_type.is_some()
    }

    /// System messages never count as read or unread.
    pub fn is_read(&self) -> bool {
        !self.is_system_message() && self.read_at.is_some()
    }

    /// `read_at: null -> at`, once. Returns whether the row changed.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_system_message() || self.read_at.is_some() {
            return false;
        }
        self.read_at = Some(at);
        true
    }

    pub fn conversation_key(&self, viewer_id: &str) -> ConversationKey {
        match &self.target {
            MessageTarget::Direct { receiver_id } => {
                if self.sender_id == viewer_id {
                    ConversationKey::direct(receiver_id.clone())
                } else {
                    ConversationKey::direct(self.sender_id.clone())
                }
            }
            MessageTarget::Thread { thread_id } => ConversationKey::thread(thread_id.clone()),
        }
    }

    pub fn channel_id(&self) -> String {
        match &self.target {
            MessageTarget::Direct { receiver_id } => direct_channel_id(&self.sender_id, receiver_id),
            MessageTarget::Thread { thread_id } => thread_channel_id(thread_id),
        }
    }

    /// Incoming, not a system notice, and never seen.
    pub fn is_unread_for(&self, viewer_id: &str) -> bool {
        self.sender_id != viewer_id && !self.is_system_message() && self.read_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadMember {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
}

/// Group conversation; `participants` are ordered by join time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    pub id: String,
    pub name: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<ThreadMember>,
}

impl Thread {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.participants.iter().any(|m| m.user_id == user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingStatus {
    pub user_id: String,
    pub conversation_id: String,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, receiver: &str) -> MessageRow {
        MessageRow {
            id: "m1".to_string(),
            sender_id: sender.to_string(),
            target: MessageTarget::Direct { receiver_id: receiver.to_string() },
            text: "hey".to_string(),
            created_at: Utc::now(),
            read_at: None,
            image_url: None,
            file_url: None,
            file_name: None,
            system_message_type: None,
        }
    }

    #[test]
    fn unknown_privacy_setting_falls_back_to_connections() {
        assert_eq!(ContactPrivacy::from_setting(None), ContactPrivacy::Connections);
        assert_eq!(ContactPrivacy::from_setting(Some("friends-only")), ContactPrivacy::Connections);
        assert_eq!(ContactPrivacy::from_setting(Some(" Public ")), ContactPrivacy::Public);
        assert_eq!(ContactPrivacy::from_setting(Some("PRIVATE")), ContactPrivacy::Private);
    }

    #[test]
    fn privacy_deserializes_leniently() {
        let privacy: ContactPrivacy = serde_json::from_str("\"whatever\"").unwrap();
        assert_eq!(privacy, ContactPrivacy::Connections);
        assert_eq!(serde_json::to_string(&ContactPrivacy::Public).unwrap(), "\"public\"");
    }

    #[test]
    fn null_settings_in_a_profile_row_use_defaults() {
        let row = r#"{"id":"p1","first_name":null,"last_name":null,"avatar_url":null,"email":"a@b.c","phone":null,"contact_privacy":null,"role":null,"created_at":"2024-01-01T00:00:00Z"}"#;
        let profile: Profile = serde_json::from_str(row).unwrap();
        assert_eq!(profile.contact_privacy, ContactPrivacy::Connections);
        assert_eq!(profile.role, ProfileRole::Athlete);

        let missing = r#"{"id":"p2","first_name":null,"last_name":null,"avatar_url":null,"email":null,"phone":null,"created_at":"2024-01-01T00:00:00Z"}"#;
        let profile: Profile = serde_json::from_str(missing).unwrap();
        assert_eq!(profile.contact_privacy, ContactPrivacy::Connections);

        let role: ProfileRole = serde_json::from_str("\"Mentor\"").unwrap();
        assert_eq!(role, ProfileRole::Mentor);
    }

    #[test]
    fn names_degrade_gracefully() {
        assert_eq!(full_name(Some(" Jo "), Some("Lin")), "Jo Lin");
        assert_eq!(full_name(None, Some("Lin")), "Lin");
        assert_eq!(full_name(Some("  "), None), "");
        assert_eq!(initials(Some("jo"), Some("lin")), "JL");
        assert_eq!(initials(Some("Amy"), None), "A");
        assert_eq!(initials(None, Some(" ")), "?");
    }

    #[test]
    fn mark_read_is_one_way_and_idempotent() {
        let mut row = message("a", "b");
        let first = Utc::now();
        assert!(row.mark_read(first));
        assert!(!row.mark_read(first + chrono::Duration::seconds(5)));
        assert_eq!(row.read_at, Some(first));
        assert!(row.is_read());
    }

    #[test]
    fn system_messages_never_carry_read_state() {
        let mut row = message("a", "b");
        row.system_message_type = Some(SystemMessageType::UserLeft);
        assert!(!row.mark_read(Utc::now()));
        assert!(!row.is_read());
        assert!(!row.is_unread_for("b"));
    }

    #[test]
    fn conversation_key_points_at_the_other_party() {
        let row = message("a", "b");
        assert_eq!(row.conversation_key("a"), ConversationKey::direct("b"));
        assert_eq!(row.conversation_key("b"), ConversationKey::direct("a"));
        assert_eq!(row.channel_id(), ConversationKey::direct("a").channel_id("b"));
        assert_eq!(row.channel_id(), "direct:a:b");
    }
}
