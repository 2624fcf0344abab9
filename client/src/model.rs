use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const USERS: &str = "users";
pub const CHATS: &str = "chats";

/// Collection holding the messages of one conversation.
pub fn messages_collection(chat_id: &str) -> String {
    format!("{CHATS}/{chat_id}/messages")
}

/// Field path of a participant's unread counter.
pub fn unread_field(uid: &str) -> String {
    format!("unreadCounts.{uid}")
}

/// Deterministic id of the private conversation between two users. The pair
/// is encoded as a JSON array so uids containing separators cannot collide.
pub fn private_conversation_id(a: &str, b: &str) -> String {
    let (min, max) = if a < b { (a, b) } else { (b, a) };
    let name = format!("private:{}", serde_json::Value::from(vec![min, max]));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "id")]
    pub uid: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
    Channel,
}

impl ConversationKind {
    pub const ALL: [ConversationKind; 3] = [Self::Private, Self::Group, Self::Channel];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_message_time: Option<i64>,
    #[serde(default)]
    pub last_message_sender: Option<String>,
    #[serde(default)]
    pub unread_counts: BTreeMap<String, u32>,
    pub created_by: String,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub subscribers: Vec<String>,
}

impl Conversation {
    /// Unread badge of `uid` in this conversation.
    pub fn unread_for(&self, uid: &str) -> u32 {
        self.unread_counts.get(uid).copied().unwrap_or(0)
    }

    pub fn has_participant(&self, uid: &str) -> bool {
        self.participants.iter().any(|p| p == uid)
    }

    /// Whether this is the private conversation of exactly `{a, b}`.
    pub fn is_private_between(&self, a: &str, b: &str) -> bool {
        if self.kind != ConversationKind::Private {
            return false;
        }
        if !self.has_participant(a) || !self.has_participant(b) {
            return false;
        }
        self.participants.iter().all(|p| p == a || p == b)
    }

    /// The participant of a private conversation who is not `viewer`.
    pub fn counterpart(&self, viewer: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != viewer)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}
