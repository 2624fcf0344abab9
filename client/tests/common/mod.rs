#![allow(dead_code)]

use std::sync::Arc;

use chat_client::{ChatClient, Settings};
use chat_store::MemoryStore;
use store_api::{Patch, RemoteStore};

/// `(uid, display name, phone)` of the users every test starts with.
pub const USERS: [(&str, &str, &str); 3] = [
    ("alice", "Alice", "+100"),
    ("bob", "Bob", "+200"),
    ("carol", "Carol", "+300"),
];

pub async fn seed(store: &MemoryStore) {
    for (uid, name, phone) in USERS {
        store
            .create(
                "users",
                uid,
                Patch::new()
                    .set("displayName", name)
                    .set("username", uid)
                    .set("phone", phone),
            )
            .await
            .unwrap();
    }
}

pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    seed(&store).await;
    store
}

pub async fn login(store: &Arc<MemoryStore>, uid: &str) -> ChatClient {
    ChatClient::login(store.clone(), uid, Settings::default())
        .await
        .unwrap()
}

/// Apply every change already delivered to `client`.
pub async fn drain(client: &mut ChatClient) {
    while let Ok(Some(change)) =
        tokio::time::timeout(std::time::Duration::from_millis(20), client.next_change()).await
    {
        client.apply(change).await.unwrap();
    }
}
