use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::models::conversation::ConversationParticipant;
use crate::common::{MessageRow, MessageTarget, SystemMessageType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Read,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Avatar {
    Image { url: String },
    Initials { text: String },
}

impl Avatar {
    /// Picture when available, otherwise initials ("?" when none can be derived).
    pub fn for_participant(participant: Option<&ConversationParticipant>) -> Self {
        match participant {
            Some(p) => match p.avatar_url.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() => Avatar::Image { url: url.to_string() },
                _ => Avatar::Initials { text: p.initials() },
            },
            None => Avatar::Initials { text: "?".to_string() },
        }
    }
}

/// Indicator rendered next to an outgoing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadReceipt {
    Hidden,
    Sent,
    Seen { avatar: Avatar },
}

/// Message as displayed to one viewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
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
    pub is_own: bool,
    pub status: MessageStatus,
}

impl MessageView {
    pub fn from_row(row: &MessageRow, viewer_id: &str) -> Self {
        Self {
            id: row.id.clone(),
            sender_id: row.sender_id.clone(),
            target: row.target.clone(),
            text: row.text.clone(),
            created_at: row.created_at,
            read_at: row.read_at,
            image_url: row.image_url.clone(),
            file_url: row.file_url.clone(),
            file_name: row.file_name.clone(),
            system_message_type: row.system_message_type,
            is_own: row.sender_id == viewer_id,
            status: if row.is_read() { MessageStatus::Read } else { MessageStatus::Sent },
        }
    }

    pub fn is_system_message(&self) -> bool {
        self.system_message_type.is_some()
    }

    pub fn is_read(&self) -> bool {
        self.status == MessageStatus::Read
    }

    /// Applies a read transition. Only the first one sticks; system messages ignore it.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_system_message() || self.read_at.is_some() {
            return false;
        }
        self.read_at = Some(at);
        self.status = MessageStatus::Read;
        true
    }

    pub fn receipt(&self, recipient: Option<&ConversationParticipant>) -> ReadReceipt {
        if self.is_system_message() || !self.is_own {
            return ReadReceipt::Hidden;
        }
        match self.status {
            MessageStatus::Read => ReadReceipt::Seen { avatar: Avatar::for_participant(recipient) },
            MessageStatus::Sent => ReadReceipt::Sent,
        }
    }
}

/// Views for `rows`, oldest first. Rows with equal timestamps keep their input order.
pub fn build_message_views(rows: &[MessageRow], viewer_id: &str) -> Vec<MessageView> {
    let mut views: Vec<MessageView> = rows.iter().map(|row| MessageView::from_row(row, viewer_id)).collect();
    views.sort_by_key(|m| m.created_at);
    views
}

/// Index of the newest message the viewer sent (system messages excluded).
pub fn latest_own_index(messages: &[MessageView]) -> Option<usize> {
    messages.iter().rposition(|m| m.is_own && !m.is_system_message())
}

/// The single receipt a conversation shows: on the viewer's latest outgoing message.
pub fn latest_read_receipt<'a>(
    messages: &'a [MessageView],
    recipient: Option<&ConversationParticipant>,
) -> Option<(&'a str, ReadReceipt)> {
    latest_own_index(messages).map(|i| (messages[i].id.as_str(), messages[i].receipt(recipient)))
}
