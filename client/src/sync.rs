use store_api::{ChangeEvent, Filter, RemoteStore, Subscription};
use tracing::debug;

use crate::model::{messages_collection, CHATS, USERS};

/// A change delivered by one of the live subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A conversation the viewer participates in (or just left).
    Conversation(ChangeEvent),
    /// A user document.
    User(ChangeEvent),
    /// A message of the open conversation.
    Message {
        conversation_id: String,
        event: ChangeEvent,
    },
}

struct FeedWatch {
    conversation_id: String,
    subscription: Subscription,
}

/// Live subscriptions of a session: the viewer's conversations, the users
/// collection and, while a conversation is open, its messages.
pub struct LiveSync {
    chats: Subscription,
    users: Subscription,
    feed: Option<FeedWatch>,
}

impl LiveSync {
    pub fn open(store: &dyn RemoteStore, viewer: &str) -> Self {
        debug!(viewer, "opening live subscriptions");
        Self {
            chats: store.subscribe(CHATS, vec![Filter::array_contains("participants", viewer)]),
            users: store.subscribe(USERS, Vec::new()),
            feed: None,
        }
    }

    /// Follow the messages of `conversation_id`, replacing any previous feed.
    pub fn watch_feed(&mut self, store: &dyn RemoteStore, conversation_id: &str) {
        if self.watching() == Some(conversation_id) {
            return;
        }
        self.feed = Some(FeedWatch {
            conversation_id: conversation_id.to_string(),
            subscription: store.subscribe(&messages_collection(conversation_id), Vec::new()),
        });
    }

    pub fn unwatch_feed(&mut self) {
        self.feed = None;
    }

    pub fn watching(&self) -> Option<&str> {
        self.feed.as_ref().map(|f| f.conversation_id.as_str())
    }

    /// Wait for the next change. Returns `None` once the store has gone
    /// away. Cancel safe.
    pub async fn next(&mut self) -> Option<Change> {
        loop {
            let feed_closed = tokio::select! {
                event = self.chats.next() => return event.map(Change::Conversation),
                event = self.users.next() => return event.map(Change::User),
                change = next_message(&mut self.feed), if self.feed.is_some() => match change {
                    Some(change) => return Some(change),
                    None => true,
                },
            };
            if feed_closed {
                self.feed = None;
            }
        }
    }

    /// Take an already delivered change without waiting.
    pub fn try_next(&mut self) -> Option<Change> {
        if let Some(event) = self.chats.try_next() {
            return Some(Change::Conversation(event));
        }
        if let Some(event) = self.users.try_next() {
            return Some(Change::User(event));
        }
        let feed = self.feed.as_mut()?;
        let event = feed.subscription.try_next()?;
        Some(Change::Message {
            conversation_id: feed.conversation_id.clone(),
            event,
        })
    }
}

async fn next_message(feed: &mut Option<FeedWatch>) -> Option<Change> {
    let feed = feed.as_mut()?;
    let event = feed.subscription.next().await?;
    Some(Change::Message {
        conversation_id: feed.conversation_id.clone(),
        event,
    })
}
