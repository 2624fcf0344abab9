//! Human-readable labels derived from conversations and messages.

use crate::contacts::ContactBook;
use crate::model::{Conversation, ConversationKind, Message, User};

pub const UNKNOWN: &str = "Unknown";
pub const UNTITLED: &str = "Untitled";

/// Best label for a user: display name, then phone, then [`UNKNOWN`].
pub fn user_label(user: &User) -> &str {
    [user.display_name.trim(), user.phone.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN)
}

/// Title of `conversation` as seen by `viewer`.
pub fn display_name(conversation: &Conversation, viewer: &str, contacts: &ContactBook) -> String {
    match conversation.kind {
        ConversationKind::Private => conversation
            .counterpart(viewer)
            .and_then(|uid| contacts.get(uid))
            .map_or(UNKNOWN, user_label)
            .to_string(),
        ConversationKind::Group | ConversationKind::Channel => conversation
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNTITLED)
            .to_string(),
    }
}

pub fn subtitle(conversation: &Conversation) -> String {
    match conversation.kind {
        ConversationKind::Private => "private messages".to_string(),
        ConversationKind::Group => format!("{} members", conversation.participants.len()),
        ConversationKind::Channel => "channel".to_string(),
    }
}

/// Author line shown above a message.
pub fn sender_label(message: &Message, viewer: &str, contacts: &ContactBook) -> String {
    if message.sender_id == viewer {
        return "You".to_string();
    }
    contacts
        .get(&message.sender_id)
        .map_or(UNKNOWN, user_label)
        .to_string()
}
