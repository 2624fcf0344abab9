use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use store_api::{ChangeEvent, ChangeKind, Direction, Filter, Patch, Query, RemoteStore};
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::model::{
    private_conversation_id, unread_field, Conversation, ConversationKind, CHATS, USERS,
};

#[derive(Default)]
struct Mirror {
    private: Vec<Conversation>,
    group: Vec<Conversation>,
    channel: Vec<Conversation>,
}

impl Mirror {
    fn list(&self, kind: ConversationKind) -> &Vec<Conversation> {
        match kind {
            ConversationKind::Private => &self.private,
            ConversationKind::Group => &self.group,
            ConversationKind::Channel => &self.channel,
        }
    }

    fn list_mut(&mut self, kind: ConversationKind) -> &mut Vec<Conversation> {
        match kind {
            ConversationKind::Private => &mut self.private,
            ConversationKind::Group => &mut self.group,
            ConversationKind::Channel => &mut self.channel,
        }
    }

    fn find(&self, id: &str) -> Option<&Conversation> {
        self.private
            .iter()
            .chain(self.group.iter())
            .chain(self.channel.iter())
            .find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.private
            .iter_mut()
            .chain(self.group.iter_mut())
            .chain(self.channel.iter_mut())
            .find(|c| c.id == id)
    }

    fn remove(&mut self, id: &str) {
        for kind in ConversationKind::ALL {
            self.list_mut(kind).retain(|c| c.id != id);
        }
    }

    fn prepend(&mut self, conversation: Conversation, cap: usize) {
        self.remove(&conversation.id);
        let list = self.list_mut(conversation.kind);
        list.insert(0, conversation);
        list.truncate(cap);
    }
}

/// In-memory mirror of the viewer's conversations, kept per kind in
/// `lastMessageTime` order. The mirror reflects the last completed fetch
/// plus the viewer's own writes.
pub struct ConversationRepository {
    store: Arc<dyn RemoteStore>,
    viewer: String,
    page_size: usize,
    mirror: Mutex<Mirror>,
    private_lock: tokio::sync::Mutex<()>,
}

impl ConversationRepository {
    pub fn new(store: Arc<dyn RemoteStore>, viewer: impl Into<String>, page_size: usize) -> Self {
        Self {
            store,
            viewer: viewer.into(),
            page_size,
            mirror: Mutex::new(Mirror::default()),
            private_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    fn membership(&self) -> Filter {
        Filter::array_contains("participants", self.viewer.as_str())
    }

    /// Fetch the first page of conversations of `kind`, newest activity
    /// first, replacing the mirror for that kind. On failure the mirror is
    /// left as it was.
    pub async fn list(&self, kind: ConversationKind) -> Result<Vec<Conversation>> {
        let query = Query::new()
            .filter(self.membership())
            .filter(Filter::eq("type", kind.as_str()))
            .order_by("lastMessageTime", Direction::Desc)
            .limit(self.page_size);
        let docs = self.store.query(CHATS, &query).await?;
        let conversations = docs
            .iter()
            .map(|d| d.decode::<Conversation>())
            .collect::<store_api::Result<Vec<_>>>()?;
        debug!(%kind, count = conversations.len(), "conversation list loaded");
        *self.mirror.lock().list_mut(kind) = conversations.clone();
        Ok(conversations)
    }

    /// Re-fetch every kind. Stops at the first failure.
    pub async fn refresh_all(&self) -> Result<()> {
        for kind in ConversationKind::ALL {
            self.list(kind).await?;
        }
        Ok(())
    }

    /// Current mirror of one kind.
    pub fn snapshot(&self, kind: ConversationKind) -> Vec<Conversation> {
        self.mirror.lock().list(kind).clone()
    }

    /// Look up a conversation in the mirror.
    pub fn get(&self, id: &str) -> Result<Conversation> {
        self.mirror
            .lock()
            .find(id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("conversation", id))
    }

    /// Return the private conversation with `other`, creating it if neither
    /// the mirror nor the store has one. Calls are serialized so concurrent
    /// requests for the same pair resolve to a single conversation.
    pub async fn find_or_create_private(&self, other: &str) -> Result<Conversation> {
        let other = other.trim();
        if other.is_empty() {
            return Err(ChatError::validation("user id must not be empty"));
        }
        if other == self.viewer {
            return Err(ChatError::validation(
                "cannot open a private conversation with yourself",
            ));
        }
        let _guard = self.private_lock.lock().await;

        let cached = self
            .mirror
            .lock()
            .private
            .iter()
            .find(|c| c.is_private_between(&self.viewer, other))
            .cloned();
        if let Some(existing) = cached {
            return Ok(existing);
        }

        let query = Query::new()
            .filter(self.membership())
            .filter(Filter::eq("type", ConversationKind::Private.as_str()));
        for doc in self.store.query(CHATS, &query).await? {
            let conversation: Conversation = doc.decode()?;
            if conversation.is_private_between(&self.viewer, other) {
                debug!(id = %conversation.id, "private conversation found in store");
                self.mirror.lock().prepend(conversation.clone(), self.page_size);
                return Ok(conversation);
            }
        }

        if self.store.get(USERS, other).await?.is_none() {
            return Err(ChatError::not_found("user", other));
        }
        let id = private_conversation_id(&self.viewer, other);
        let patch = Patch::new()
            .set("type", ConversationKind::Private.as_str())
            .set("participants", vec![self.viewer.clone(), other.to_string()])
            .set("createdBy", self.viewer.as_str())
            .server_timestamp("createdAt")
            .set("lastMessage", "")
            .server_timestamp("lastMessageTime")
            .set("unreadCounts", zeroed_counters(&[self.viewer.as_str(), other]));
        if self.store.create(CHATS, &id, patch).await? {
            info!(%id, with = other, "private conversation created");
        } else {
            debug!(%id, "private conversation already created elsewhere");
        }
        let conversation = self.fetch(&id).await?;
        if !conversation.is_private_between(&self.viewer, other) {
            warn!(%id, with = other, "private conversation id taken by another pair");
            return Err(ChatError::Conflict(id));
        }
        self.mirror.lock().prepend(conversation.clone(), self.page_size);
        Ok(conversation)
    }

    pub async fn create_group(&self, name: &str, description: &str) -> Result<Conversation> {
        self.create_named(ConversationKind::Group, name, description, None)
            .await
    }

    pub async fn create_channel(
        &self,
        name: &str,
        description: &str,
        link: &str,
    ) -> Result<Conversation> {
        self.create_named(ConversationKind::Channel, name, description, Some(link))
            .await
    }

    async fn create_named(
        &self,
        kind: ConversationKind,
        name: &str,
        description: &str,
        link: Option<&str>,
    ) -> Result<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::validation(format!("{kind} name must not be empty")));
        }
        let members = vec![self.viewer.clone()];
        let mut patch = Patch::new()
            .set("type", kind.as_str())
            .set("name", name)
            .set("description", description.trim())
            .set("participants", members.clone())
            .set("createdBy", self.viewer.as_str())
            .server_timestamp("createdAt")
            .set("lastMessage", "")
            .server_timestamp("lastMessageTime")
            .set("unreadCounts", zeroed_counters(&[self.viewer.as_str()]));
        patch = match kind {
            ConversationKind::Group => patch.set("admins", members),
            ConversationKind::Channel => patch
                .set("link", link.unwrap_or_default().trim())
                .set("subscribers", members),
            ConversationKind::Private => patch,
        };
        let id = self.store.add(CHATS, patch).await?;
        info!(%id, %kind, name, "conversation created");
        let conversation = self.fetch(&id).await?;
        self.mirror.lock().prepend(conversation.clone(), self.page_size);
        Ok(conversation)
    }

    async fn fetch(&self, id: &str) -> Result<Conversation> {
        let doc = self
            .store
            .get(CHATS, id)
            .await?
            .ok_or_else(|| ChatError::not_found("conversation", id))?;
        Ok(doc.decode()?)
    }

    /// Reset the viewer's unread counter, remotely first and then in the
    /// mirror. Harmless when the counter is already zero.
    pub async fn mark_read(&self, id: &str) -> Result<()> {
        self.store
            .update(CHATS, id, Patch::new().set(unread_field(&self.viewer), 0))
            .await?;
        if let Some(c) = self.mirror.lock().find_mut(id) {
            c.unread_counts.insert(self.viewer.clone(), 0);
        }
        debug!(%id, "marked read");
        Ok(())
    }

    /// Mirror a successful remote increment of `uid`'s counter.
    pub(crate) fn record_increment(&self, id: &str, uid: &str) {
        if let Some(c) = self.mirror.lock().find_mut(id) {
            *c.unread_counts.entry(uid.to_string()).or_insert(0) += 1;
        }
    }

    /// Apply a change delivered by the live feed. Returns the kind whose
    /// list changed, if any.
    pub fn apply_change(&self, event: &ChangeEvent) -> Option<ConversationKind> {
        let conversation: Conversation = match event.document.decode() {
            Ok(c) => c,
            Err(err) => {
                warn!(id = %event.document.id, %err, "ignoring undecodable conversation");
                return None;
            }
        };
        let kind = conversation.kind;
        let mut mirror = self.mirror.lock();
        if event.kind == ChangeKind::Removed || !conversation.has_participant(&self.viewer) {
            mirror.remove(&conversation.id);
            return Some(kind);
        }
        mirror.remove(&conversation.id);
        let list = mirror.list_mut(kind);
        let at = list
            .iter()
            .position(|c| c.last_message_time < conversation.last_message_time)
            .unwrap_or(list.len());
        list.insert(at, conversation);
        list.truncate(self.page_size);
        Some(kind)
    }

    /// Drop every mirrored conversation.
    pub fn clear(&self) {
        *self.mirror.lock() = Mirror::default();
    }
}

fn zeroed_counters(uids: &[&str]) -> Value {
    let counters: Map<String, Value> = uids
        .iter()
        .map(|u| (u.to_string(), Value::from(0)))
        .collect();
    Value::Object(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_store::MemoryStore;

    async fn seeded() -> (Arc<MemoryStore>, ConversationRepository) {
        let store = Arc::new(MemoryStore::new());
        for uid in ["alice", "bob"] {
            store
                .create(USERS, uid, Patch::new().set("displayName", uid))
                .await
                .unwrap();
        }
        let repo = ConversationRepository::new(store.clone(), "alice", 20);
        (store, repo)
    }

    #[tokio::test]
    async fn self_conversation_is_rejected() {
        let (store, repo) = seeded().await;
        let err = repo.find_or_create_private("alice").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_store, repo) = seeded().await;
        let err = repo.find_or_create_private("zed").await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound { kind: "user", .. }));
    }

    #[tokio::test]
    async fn channel_creator_subscribes() {
        let (_store, repo) = seeded().await;
        let channel = repo
            .create_channel(" News ", " daily ", " t.me/news ")
            .await
            .unwrap();
        assert_eq!(channel.name.as_deref(), Some("News"));
        assert_eq!(channel.link.as_deref(), Some("t.me/news"));
        assert_eq!(channel.subscribers, vec!["alice".to_string()]);
        assert!(channel.admins.is_empty());
        assert_eq!(repo.snapshot(ConversationKind::Channel)[0].id, channel.id);
    }

    #[tokio::test]
    async fn mirror_stays_within_page_size() {
        let store = Arc::new(MemoryStore::new());
        let repo = ConversationRepository::new(store.clone(), "alice", 2);
        let mut ids = Vec::new();
        for name in ["one", "two", "three"] {
            ids.push(repo.create_group(name, "").await.unwrap().id);
        }
        let listed: Vec<_> = repo
            .snapshot(ConversationKind::Group)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(listed, vec![ids[2].clone(), ids[1].clone()]);

        let id = store
            .add(
                CHATS,
                Patch::new()
                    .set("type", "group")
                    .set("name", "four")
                    .set("participants", vec!["alice"])
                    .set("createdBy", "bob")
                    .server_timestamp("lastMessageTime"),
            )
            .await
            .unwrap();
        let event = ChangeEvent {
            kind: ChangeKind::Added,
            collection: CHATS.into(),
            document: store.get(CHATS, &id).await.unwrap().unwrap(),
        };
        repo.apply_change(&event);
        let listed = repo.snapshot(ConversationKind::Group);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[1].id, ids[2]);
    }

    #[tokio::test]
    async fn foreign_document_under_private_id_is_refused() {
        let (store, repo) = seeded().await;
        let id = private_conversation_id("alice", "bob");
        store
            .create(
                CHATS,
                &id,
                Patch::new()
                    .set("type", "private")
                    .set("participants", vec!["mallory", "bob"])
                    .set("createdBy", "mallory"),
            )
            .await
            .unwrap();
        let err = repo.find_or_create_private("bob").await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(ref conflict) if *conflict == id));
        assert!(repo.snapshot(ConversationKind::Private).is_empty());
    }

    #[tokio::test]
    async fn removal_events_drop_from_mirror() {
        let (store, repo) = seeded().await;
        let group = repo.create_group("Team", "").await.unwrap();
        let doc = store.get(CHATS, &group.id).await.unwrap().unwrap();
        let event = ChangeEvent {
            kind: ChangeKind::Removed,
            collection: CHATS.into(),
            document: doc,
        };
        assert_eq!(repo.apply_change(&event), Some(ConversationKind::Group));
        assert!(repo.snapshot(ConversationKind::Group).is_empty());
        assert!(repo.get(&group.id).is_err());
    }
}
