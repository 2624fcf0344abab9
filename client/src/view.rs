//! Read-only projections pushed to the presentation layer.

use serde::Serialize;
use time::UtcOffset;

use crate::contacts::ContactBook;
use crate::feed::{format_clock, format_list_time, FeedItem};
use crate::model::{Conversation, ConversationKind, User};
use crate::naming::{display_name, sender_label, subtitle, user_label};

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRow {
    pub id: String,
    pub kind: ConversationKind,
    pub title: String,
    pub subtitle: String,
    pub last_message: String,
    pub time: Option<String>,
    pub unread: u32,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedRow {
    Day {
        label: String,
    },
    Message {
        id: String,
        sender: String,
        text: String,
        time: String,
        own: bool,
    },
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ContactRow {
    pub uid: String,
    pub name: String,
    pub username: String,
    pub phone: String,
    pub online: bool,
}

/// Context needed to render rows for one viewer.
pub struct ViewContext<'a> {
    pub viewer: &'a str,
    pub contacts: &'a ContactBook,
    pub offset: UtcOffset,
    pub now_ms: i64,
}

impl ViewContext<'_> {
    pub fn conversation_rows(&self, conversations: &[Conversation]) -> Vec<ConversationRow> {
        conversations
            .iter()
            .map(|c| ConversationRow {
                id: c.id.clone(),
                kind: c.kind,
                title: display_name(c, self.viewer, self.contacts),
                subtitle: subtitle(c),
                last_message: c.last_message.clone(),
                time: c
                    .last_message_time
                    .map(|ts| format_list_time(ts, self.now_ms, self.offset)),
                unread: c.unread_for(self.viewer),
            })
            .collect()
    }

    pub fn feed_rows(&self, items: &[FeedItem]) -> Vec<FeedRow> {
        items
            .iter()
            .map(|item| match item {
                FeedItem::Day(day) => FeedRow::Day { label: day.label() },
                FeedItem::Message(m) => FeedRow::Message {
                    id: m.id.clone(),
                    sender: sender_label(m, self.viewer, self.contacts),
                    text: m.text.clone(),
                    time: format_clock(m.timestamp, self.offset),
                    own: m.sender_id == self.viewer,
                },
            })
            .collect()
    }
}

pub fn contact_rows(users: &[User]) -> Vec<ContactRow> {
    users
        .iter()
        .map(|u| ContactRow {
            uid: u.uid.clone(),
            name: user_label(u).to_string(),
            username: u.username.clone(),
            phone: u.phone.clone(),
            online: u.is_online,
        })
        .collect()
}
