use store_api::{Patch, RemoteStore};
use tracing::info;

use crate::error::Result;
use crate::model::USERS;

fn presence_patch(online: bool) -> Patch {
    Patch::new()
        .set("isOnline", online)
        .set("status", if online { "online" } else { "offline" })
        .server_timestamp("lastSeen")
}

/// Mark `uid` online and stamp `lastSeen`.
pub async fn announce_online(store: &dyn RemoteStore, uid: &str) -> Result<()> {
    store.update(USERS, uid, presence_patch(true)).await?;
    info!(uid, "presence online");
    Ok(())
}

/// Mark `uid` offline and stamp `lastSeen`.
pub async fn announce_offline(store: &dyn RemoteStore, uid: &str) -> Result<()> {
    store.update(USERS, uid, presence_patch(false)).await?;
    info!(uid, "presence offline");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn login_and_logout_flip_status() {
        let store = MemoryStore::new();
        store
            .create(USERS, "alice", Patch::new().set("displayName", "Alice"))
            .await
            .unwrap();

        announce_online(&store, "alice").await.unwrap();
        let doc = store.get(USERS, "alice").await.unwrap().unwrap();
        assert_eq!(doc.fields["isOnline"], json!(true));
        assert_eq!(doc.fields["status"], json!("online"));
        let first_seen = doc.fields["lastSeen"].as_i64().unwrap();

        announce_offline(&store, "alice").await.unwrap();
        let doc = store.get(USERS, "alice").await.unwrap().unwrap();
        assert_eq!(doc.fields["isOnline"], json!(false));
        assert_eq!(doc.fields["status"], json!("offline"));
        assert!(doc.fields["lastSeen"].as_i64().unwrap() > first_seen);
    }
}
