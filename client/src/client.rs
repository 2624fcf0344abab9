use std::sync::Arc;

use store_api::{ChangeKind, Patch, RemoteStore};
use tracing::{debug, info, warn};

use crate::contacts::{ContactBook, Directory};
use crate::conversations::ConversationRepository;
use crate::error::{ChatError, Result};
use crate::feed::{group_by_day, FeedItem, FeedLoader};
use crate::model::{
    messages_collection, Conversation, ConversationKind, Message, User, CHATS, USERS,
};
use crate::presence::{announce_offline, announce_online};
use crate::reads::UnreadTracker;
use crate::session::{Session, Settings};
use crate::sync::{Change, LiveSync};
use crate::view::ViewContext;

/// What a live change touched, so callers know what to re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Conversations(ConversationKind),
    Contacts,
    Feed(String),
    Nothing,
}

/// Entry point of the core for one logged-in user.
pub struct ChatClient {
    store: Arc<dyn RemoteStore>,
    session: Session,
    repo: Arc<ConversationRepository>,
    feed: FeedLoader,
    unread: UnreadTracker,
    directory: Directory,
    sync: LiveSync,
}

impl ChatClient {
    /// Start a session for `uid`: mark it online, subscribe to live changes
    /// and load contacts and every conversation list.
    pub async fn login(store: Arc<dyn RemoteStore>, uid: &str, settings: Settings) -> Result<Self> {
        let doc = store
            .get(USERS, uid)
            .await?
            .ok_or_else(|| ChatError::not_found("user", uid))?;
        let user: User = doc.decode()?;
        announce_online(store.as_ref(), &user.uid).await?;

        let repo = Arc::new(ConversationRepository::new(
            store.clone(),
            user.uid.as_str(),
            settings.page_size,
        ));
        let client = Self {
            feed: FeedLoader::new(store.clone(), settings.feed_limit),
            unread: UnreadTracker::new(store.clone(), repo.clone()),
            directory: Directory::new(
                store.clone(),
                user.uid.as_str(),
                settings.contacts_limit,
                settings.search_limit,
            ),
            sync: LiveSync::open(store.as_ref(), &user.uid),
            session: Session::new(user, settings),
            repo,
            store,
        };
        client.directory.load_contacts().await?;
        client.refresh().await?;
        info!(uid = client.viewer(), "logged in");
        Ok(client)
    }

    pub fn viewer(&self) -> &str {
        self.session.viewer()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reload every conversation list.
    pub async fn refresh(&self) -> Result<()> {
        self.repo.refresh_all().await?;
        self.learn_counterparts(&self.repo.snapshot(ConversationKind::Private))
            .await;
        Ok(())
    }

    /// Reload one conversation list.
    pub async fn list(&self, kind: ConversationKind) -> Result<Vec<Conversation>> {
        let conversations = self.repo.list(kind).await?;
        if kind == ConversationKind::Private {
            self.learn_counterparts(&conversations).await;
        }
        Ok(conversations)
    }

    /// Fetch profiles of private-chat partners missing from the book so
    /// their names resolve. Failures only degrade naming.
    async fn learn_counterparts(&self, conversations: &[Conversation]) {
        for c in conversations {
            let Some(other) = c.counterpart(self.viewer()) else {
                continue;
            };
            if let Err(err) = self.directory.ensure(other).await {
                warn!(uid = other, %err, "could not load conversation partner");
            }
        }
    }

    pub fn conversations(&self, kind: ConversationKind) -> Vec<Conversation> {
        self.repo.snapshot(kind)
    }

    pub fn conversation(&self, id: &str) -> Result<Conversation> {
        self.repo.get(id)
    }

    pub fn unread_badge(&self, id: &str) -> u32 {
        self.repo
            .get(id)
            .map_or(0, |c| c.unread_for(self.viewer()))
    }

    pub fn contacts(&self) -> Vec<User> {
        self.directory.contacts()
    }

    pub fn contact_book(&self) -> ContactBook {
        self.directory.book()
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        self.directory.search_users(query).await
    }

    /// Make `id` the open conversation and return its day-grouped history.
    pub async fn open_conversation(&mut self, id: &str) -> Result<Vec<FeedItem>> {
        let conversation = self.repo.get(id)?;
        self.session.set_current(Some(conversation.id.clone()));
        self.sync.watch_feed(self.store.as_ref(), &conversation.id);
        let items = self.feed().await?;
        self.unread.on_conversation_opened(&conversation).await?;
        debug!(%id, items = items.len(), "conversation opened");
        Ok(items)
    }

    /// Open the private conversation with `other`, creating it on first contact.
    pub async fn open_private(&mut self, other: &str) -> Result<(Conversation, Vec<FeedItem>)> {
        let conversation = self.repo.find_or_create_private(other).await?;
        self.learn_counterparts(std::slice::from_ref(&conversation))
            .await;
        let items = self.open_conversation(&conversation.id).await?;
        Ok((conversation, items))
    }

    /// Reload the feed of the open conversation.
    pub async fn feed(&self) -> Result<Vec<FeedItem>> {
        let Some(id) = self.session.current() else {
            return Ok(Vec::new());
        };
        let messages = self.feed.load(&id).await?;
        Ok(group_by_day(
            messages,
            self.session.settings().utc_offset,
            self.session.today(),
        ))
    }

    pub fn close_conversation(&mut self) {
        self.session.set_current(None);
        self.sync.unwatch_feed();
    }

    /// Post a text message. The message and the conversation summary are
    /// written first; unread delivery failures are reported after the list
    /// has been reloaded.
    pub async fn send_text(&self, conversation_id: &str, text: &str) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::validation("message must not be empty"));
        }
        let conversation = self.repo.get(conversation_id)?;
        let collection = messages_collection(&conversation.id);
        let message = Patch::new()
            .set("chatId", conversation.id.as_str())
            .set("senderId", self.viewer())
            .set("text", text)
            .server_timestamp("timestamp")
            .set("type", "text");
        let message_id = self.store.add(&collection, message).await?;
        self.store
            .update(
                CHATS,
                &conversation.id,
                Patch::new()
                    .set("lastMessage", text)
                    .server_timestamp("lastMessageTime")
                    .set("lastMessageSender", self.viewer()),
            )
            .await?;
        debug!(id = %conversation.id, %message_id, "message sent");

        let delivery = self.unread.on_message_sent(&conversation, self.viewer()).await;
        self.list(conversation.kind).await?;
        delivery?;

        let stored = self
            .store
            .get(&collection, &message_id)
            .await?
            .ok_or_else(|| ChatError::not_found("message", message_id.as_str()))?;
        Ok(stored.decode()?)
    }

    pub async fn create_group(&self, name: &str, description: &str) -> Result<Conversation> {
        self.repo.create_group(name, description).await
    }

    pub async fn create_channel(
        &self,
        name: &str,
        description: &str,
        link: &str,
    ) -> Result<Conversation> {
        self.repo.create_channel(name, description, link).await
    }

    /// Wait for the next live change. Cancel safe; pair with [`Self::apply`].
    pub async fn next_change(&mut self) -> Option<Change> {
        self.sync.next().await
    }

    /// Fold a live change into the mirrors.
    pub async fn apply(&mut self, change: Change) -> Result<Update> {
        match change {
            Change::Conversation(event) => {
                let Some(kind) = self.repo.apply_change(&event) else {
                    return Ok(Update::Nothing);
                };
                let id = event.document.id.as_str();
                if event.kind != ChangeKind::Removed && self.session.is_current(id) {
                    if let Ok(conversation) = self.repo.get(id) {
                        self.learn_counterparts(std::slice::from_ref(&conversation))
                            .await;
                        self.unread.on_conversation_opened(&conversation).await?;
                    }
                }
                Ok(Update::Conversations(kind))
            }
            Change::User(event) => Ok(if self.directory.apply_change(&event) {
                Update::Contacts
            } else {
                Update::Nothing
            }),
            Change::Message {
                conversation_id, ..
            } => Ok(if self.session.is_current(&conversation_id) {
                Update::Feed(conversation_id)
            } else {
                Update::Nothing
            }),
        }
    }

    /// Wait for the next live change and apply it. `None` once the store
    /// has gone away.
    pub async fn next_update(&mut self) -> Option<Result<Update>> {
        let change = self.next_change().await?;
        Some(self.apply(change).await)
    }

    /// Renderer for the current mirrors.
    pub fn view<'a>(&'a self, contacts: &'a ContactBook) -> ViewContext<'a> {
        ViewContext {
            viewer: self.viewer(),
            contacts,
            offset: self.session.settings().utc_offset,
            now_ms: self.session.now_ms(),
        }
    }

    /// Mark the user offline and drop the session.
    pub async fn logout(self) -> Result<()> {
        let uid = self.viewer().to_string();
        let result = announce_offline(self.store.as_ref(), &uid).await;
        self.repo.clear();
        self.directory.clear();
        info!(%uid, "logged out");
        result
    }
}
