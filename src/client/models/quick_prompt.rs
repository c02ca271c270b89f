use serde::{Deserialize, Serialize};

use crate::common::ConnectionType;

/// Pre-written conversation starter, one per relationship category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuickPrompt {
    Mentorship,
    Opportunity,
    Connect,
}

impl QuickPrompt {
    pub fn for_connection(connection_type: ConnectionType) -> Self {
        match connection_type {
            ConnectionType::Mentor => QuickPrompt::Mentorship,
            ConnectionType::Employer => QuickPrompt::Opportunity,
            ConnectionType::Peer => QuickPrompt::Connect,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QuickPrompt::Mentorship => "Ask for mentorship",
            QuickPrompt::Opportunity => "Ask about opportunities",
            QuickPrompt::Connect => "Say hello",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            QuickPrompt::Mentorship => "Hi! I'd love to learn from your experience. Would you be open to a quick mentorship chat?",
            QuickPrompt::Opportunity => "Hi! I'm interested in opportunities with your organization. Could we talk about open roles?",
            QuickPrompt::Connect => "Hey! Great to connect. How's your season going?",
        }
    }
}

/// The prompts offered for a conversation: always exactly one.
pub fn available_prompts(connection_type: ConnectionType) -> [QuickPrompt; 1] {
    [QuickPrompt::for_connection(connection_type)]
}
