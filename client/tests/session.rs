mod common;

use std::sync::Arc;

use chat_client::feed::FeedItem;
use chat_client::model::{messages_collection, ConversationKind, CHATS};
use chat_client::naming::display_name;
use chat_client::{ChatClient, ChatError, Settings, Update};
use chat_store::{Operation, SqliteStore};
use serde_json::json;
use store_api::{Patch, RemoteStore};

async fn unread(store: &impl RemoteStore, id: &str, uid: &str) -> i64 {
    store
        .get(CHATS, id)
        .await
        .unwrap()
        .unwrap()
        .get(&format!("unreadCounts.{uid}"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

#[tokio::test]
async fn unknown_user_cannot_log_in() {
    let store = common::seeded_store().await;
    let err = ChatClient::login(store, "mallory", Settings::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::NotFound { kind: "user", .. }));
}

#[tokio::test]
async fn login_and_logout_update_presence() {
    let store = common::seeded_store().await;
    let alice = common::login(&store, "alice").await;
    let doc = store.get("users", "alice").await.unwrap().unwrap();
    assert_eq!(doc.fields["isOnline"], json!(true));
    assert_eq!(doc.fields["status"], json!("online"));

    let uids: Vec<_> = alice.contacts().into_iter().map(|u| u.uid).collect();
    assert_eq!(uids, vec!["bob", "carol"]);

    alice.logout().await.unwrap();
    let doc = store.get("users", "alice").await.unwrap().unwrap();
    assert_eq!(doc.fields["isOnline"], json!(false));
    assert_eq!(doc.fields["status"], json!("offline"));
}

#[tokio::test]
async fn sends_accumulate_unread_until_opened() {
    let store = common::seeded_store().await;
    let mut alice = common::login(&store, "alice").await;
    let (conv, _) = alice.open_private("bob").await.unwrap();
    for text in ["one", "two", "three"] {
        alice.send_text(&conv.id, text).await.unwrap();
    }
    assert_eq!(unread(store.as_ref(), &conv.id, "bob").await, 3);
    assert_eq!(unread(store.as_ref(), &conv.id, "alice").await, 0);

    let mut bob = common::login(&store, "bob").await;
    assert_eq!(bob.unread_badge(&conv.id), 3);
    let items = bob.open_conversation(&conv.id).await.unwrap();
    assert_eq!(unread(store.as_ref(), &conv.id, "bob").await, 0);
    assert_eq!(bob.unread_badge(&conv.id), 0);

    let texts: Vec<_> = items
        .iter()
        .filter_map(|item| match item {
            FeedItem::Message(m) => Some(m.text.as_str()),
            FeedItem::Day(_) => None,
        })
        .collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
    match &items[0] {
        FeedItem::Day(day) => assert!(day.is_today),
        other => panic!("expected a day marker, got {other:?}"),
    }
    assert_eq!(items.len(), 4);
}

#[tokio::test]
async fn private_names_resolve_from_both_sides() {
    let store = common::seeded_store().await;
    let mut alice = common::login(&store, "alice").await;
    let (conv, _) = alice.open_private("bob").await.unwrap();
    let book = alice.contact_book();
    assert_eq!(display_name(&conv, "alice", &book), "Bob");

    let bob = common::login(&store, "bob").await;
    let conv = bob.conversation(&conv.id).unwrap();
    assert_eq!(display_name(&conv, "bob", &bob.contact_book()), "Alice");
}

#[tokio::test]
async fn send_validates_input() {
    let store = common::seeded_store().await;
    let mut alice = common::login(&store, "alice").await;
    let (conv, _) = alice.open_private("bob").await.unwrap();
    let writes = store.write_count();

    let err = alice.send_text(&conv.id, "   ").await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
    let err = alice.send_text("missing", "hi").await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound { .. }));
    assert_eq!(store.write_count(), writes);
}

#[tokio::test]
async fn partial_unread_failure_is_reported() {
    let store = common::seeded_store().await;
    let mut alice = common::login(&store, "alice").await;
    let group = alice.create_group("Team", "").await.unwrap();
    store
        .update(
            CHATS,
            &group.id,
            Patch::new().set("participants", vec!["alice", "bob", "carol"]),
        )
        .await
        .unwrap();
    common::drain(&mut alice).await;
    assert_eq!(alice.conversation(&group.id).unwrap().participants.len(), 3);

    store.fail_on(Operation::Increment, "unreadCounts.carol");
    let err = alice.send_text(&group.id, "hello").await.unwrap_err();
    match err {
        ChatError::UnreadDelivery {
            delivered, missed, ..
        } => {
            assert_eq!(delivered, vec!["bob".to_string()]);
            assert_eq!(missed.len(), 1);
            assert_eq!(missed[0].participant, "carol");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.count(&messages_collection(&group.id)), 1);
    assert_eq!(unread(store.as_ref(), &group.id, "bob").await, 1);
    assert_eq!(unread(store.as_ref(), &group.id, "carol").await, 0);
    let listed = alice.conversations(ConversationKind::Group);
    assert_eq!(listed[0].last_message, "hello");
}

#[tokio::test]
async fn live_changes_reach_the_other_session() {
    let store = common::seeded_store().await;
    let mut bob = common::login(&store, "bob").await;
    let mut alice = common::login(&store, "alice").await;
    common::drain(&mut bob).await;

    let (conv, _) = alice.open_private("bob").await.unwrap();
    alice.send_text(&conv.id, "hi bob").await.unwrap();

    let mut saw_private = false;
    while let Ok(Some(update)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), bob.next_update()).await
    {
        if update.unwrap() == Update::Conversations(ConversationKind::Private) {
            saw_private = true;
        }
    }
    assert!(saw_private);
    let mirrored = bob.conversation(&conv.id).unwrap();
    assert_eq!(mirrored.last_message, "hi bob");
    assert_eq!(mirrored.unread_for("bob"), 1);

    // With the conversation open, new messages refresh the feed and clear
    // the badge.
    bob.open_conversation(&conv.id).await.unwrap();
    common::drain(&mut bob).await;
    alice.send_text(&conv.id, "again").await.unwrap();
    let mut saw_feed = false;
    while let Ok(Some(update)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), bob.next_update()).await
    {
        if update.unwrap() == Update::Feed(conv.id.clone()) {
            saw_feed = true;
        }
    }
    assert!(saw_feed);
    assert_eq!(unread(store.as_ref(), &conv.id, "bob").await, 0);
    let feed = bob.feed().await.unwrap();
    assert_eq!(feed.len(), 3);
}

#[tokio::test]
async fn search_skips_the_viewer() {
    let store = common::seeded_store().await;
    let alice = common::login(&store, "alice").await;
    let found: Vec<_> = alice
        .search_users("+")
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.uid)
        .collect();
    assert_eq!(found, vec!["bob", "carol"]);
    assert!(alice.search_users(" ").await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_backed_session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.sqlite3");
    {
        let store = SqliteStore::open(&path).unwrap();
        for (uid, name, phone) in common::USERS {
            store
                .create(
                    "users",
                    uid,
                    Patch::new().set("displayName", name).set("phone", phone),
                )
                .await
                .unwrap();
        }
        let mut alice = ChatClient::login(Arc::new(store), "alice", Settings::default())
            .await
            .unwrap();
        let (conv, _) = alice.open_private("carol").await.unwrap();
        alice.send_text(&conv.id, "persisted").await.unwrap();
        alice.logout().await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let carol = ChatClient::login(Arc::new(store), "carol", Settings::default())
        .await
        .unwrap();
    let private = carol.conversations(ConversationKind::Private);
    assert_eq!(private.len(), 1);
    assert_eq!(private[0].last_message, "persisted");
    assert_eq!(private[0].unread_for("carol"), 1);
}
