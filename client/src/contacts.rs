use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use store_api::{ChangeEvent, ChangeKind, Direction, Filter, Query, RemoteStore};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{User, USERS};

/// Users known to the session, keyed by uid.
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    users: BTreeMap<String, User>,
}

impl ContactBook {
    pub fn get(&self, uid: &str) -> Option<&User> {
        self.users.get(uid)
    }

    pub fn insert(&mut self, user: User) {
        self.users.insert(user.uid.clone(), user);
    }

    pub fn remove(&mut self, uid: &str) -> Option<User> {
        self.users.remove(uid)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[derive(Default)]
struct State {
    book: ContactBook,
    contacts: Vec<String>,
}

/// Contact list and user search backed by the `users` collection.
pub struct Directory {
    store: Arc<dyn RemoteStore>,
    viewer: String,
    contacts_limit: usize,
    search_limit: usize,
    state: Mutex<State>,
}

impl Directory {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        viewer: impl Into<String>,
        contacts_limit: usize,
        search_limit: usize,
    ) -> Self {
        Self {
            store,
            viewer: viewer.into(),
            contacts_limit,
            search_limit,
            state: Mutex::new(State::default()),
        }
    }

    /// Load users that registered a phone number, excluding the viewer.
    pub async fn load_contacts(&self) -> Result<Vec<User>> {
        let query = Query::new()
            .filter(Filter::not_eq("phone", ""))
            .limit(self.contacts_limit);
        let users = self.decode_all(self.store.query(USERS, &query).await?)?;
        debug!(count = users.len(), "contacts loaded");
        let mut state = self.state.lock();
        state.contacts = users.iter().map(|u| u.uid.clone()).collect();
        for user in &users {
            state.book.insert(user.clone());
        }
        Ok(users)
    }

    /// Prefix search over usernames and phone numbers. Results are merged by
    /// uid in first-seen order and never include the viewer.
    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut found: Vec<User> = Vec::new();
        for field in ["username", "phone"] {
            let q = Query::new()
                .filter(Filter::gte(field, needle.as_str()))
                .filter(Filter::lte(field, format!("{needle}\u{f8ff}")))
                .order_by(field, Direction::Asc)
                .limit(self.search_limit);
            for user in self.decode_all(self.store.query(USERS, &q).await?)? {
                if !found.iter().any(|u| u.uid == user.uid) {
                    found.push(user);
                }
            }
        }
        let mut state = self.state.lock();
        for user in &found {
            state.book.insert(user.clone());
        }
        Ok(found)
    }

    /// Make sure `uid` is in the book, fetching it if needed.
    pub async fn ensure(&self, uid: &str) -> Result<Option<User>> {
        if let Some(user) = self.state.lock().book.get(uid).cloned() {
            return Ok(Some(user));
        }
        let Some(doc) = self.store.get(USERS, uid).await? else {
            return Ok(None);
        };
        let user: User = doc.decode()?;
        self.state.lock().book.insert(user.clone());
        Ok(Some(user))
    }

    fn decode_all(&self, docs: Vec<store_api::Document>) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(docs.len());
        for doc in docs {
            let user: User = doc.decode()?;
            if user.uid != self.viewer {
                users.push(user);
            }
        }
        Ok(users)
    }

    /// Apply a change from the users feed. Returns whether a known user or
    /// contact changed.
    pub fn apply_change(&self, event: &ChangeEvent) -> bool {
        let user: User = match event.document.decode() {
            Ok(u) => u,
            Err(err) => {
                warn!(id = %event.document.id, %err, "ignoring undecodable user");
                return false;
            }
        };
        if user.uid == self.viewer {
            return false;
        }
        let mut state = self.state.lock();
        if event.kind == ChangeKind::Removed {
            state.contacts.retain(|c| *c != user.uid);
            return state.book.remove(&user.uid).is_some();
        }
        let is_contact = !user.phone.is_empty();
        let listed = state.contacts.contains(&user.uid);
        if is_contact && !listed && state.contacts.len() < self.contacts_limit {
            state.contacts.push(user.uid.clone());
        } else if !is_contact && listed {
            state.contacts.retain(|c| *c != user.uid);
        }
        let known = state.book.get(&user.uid).is_some() || is_contact;
        if known {
            state.book.insert(user);
        }
        known
    }

    /// Snapshot of every known user.
    pub fn book(&self) -> ContactBook {
        self.state.lock().book.clone()
    }

    /// Current contact list in load order.
    pub fn contacts(&self) -> Vec<User> {
        let state = self.state.lock();
        state
            .contacts
            .iter()
            .filter_map(|uid| state.book.get(uid).cloned())
            .collect()
    }

    pub fn clear(&self) {
        *self.state.lock() = State::default();
    }
}
