use parking_lot::Mutex;
use store_api::{ChangeEvent, ChangeKind, Document, Filter, Subscription};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

struct Subscriber {
    collection: String,
    filters: Vec<Filter>,
    tx: UnboundedSender<ChangeEvent>,
}

/// Fan-out of document changes to live subscriptions. Closed subscriptions
/// are dropped on the next publish.
#[derive(Default)]
pub struct Subscribers {
    list: Mutex<Vec<Subscriber>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> Subscription {
        let (tx, rx) = unbounded_channel();
        self.list.lock().push(Subscriber {
            collection: collection.to_string(),
            filters,
            tx,
        });
        Subscription::new(rx)
    }

    /// Publish a write. `before` is the document prior to the write, if any.
    pub fn publish(&self, collection: &str, before: Option<&Document>, after: &Document) {
        let mut list = self.list.lock();
        list.retain(|sub| {
            if sub.collection != collection {
                return !sub.tx.is_closed();
            }
            let was = before.map_or(false, |d| d.matches(&sub.filters));
            let now = after.matches(&sub.filters);
            let kind = match (was, now) {
                (false, true) => ChangeKind::Added,
                (true, true) => ChangeKind::Modified,
                (true, false) => ChangeKind::Removed,
                (false, false) => return !sub.tx.is_closed(),
            };
            sub.tx
                .send(ChangeEvent {
                    kind,
                    collection: collection.to_string(),
                    document: after.clone(),
                })
                .is_ok()
        });
    }

    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        Document::new("c1", v.as_object().cloned().unwrap())
    }

    #[test]
    fn transitions_map_to_change_kinds() {
        let subs = Subscribers::new();
        let mut sub = subs.subscribe("chats", vec![Filter::array_contains("participants", "a")]);
        let with_a = doc(json!({"participants": ["a", "b"]}));
        let without_a = doc(json!({"participants": ["b"]}));

        subs.publish("chats", None, &with_a);
        subs.publish("chats", Some(&with_a), &with_a);
        subs.publish("chats", Some(&with_a), &without_a);
        subs.publish("chats", Some(&without_a), &without_a);
        subs.publish("users", None, &with_a);

        let kinds: Vec<_> = std::iter::from_fn(|| sub.try_next()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Added, ChangeKind::Modified, ChangeKind::Removed]
        );
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let subs = Subscribers::new();
        let sub = subs.subscribe("chats", vec![]);
        assert_eq!(subs.len(), 1);
        drop(sub);
        subs.publish("chats", None, &doc(json!({})));
        assert!(subs.is_empty());
    }
}
