use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use store_api::RemoteStore;
use tracing::{debug, warn};

use crate::conversations::ConversationRepository;
use crate::error::{ChatError, MissedIncrement, Result};
use crate::model::{unread_field, Conversation, CHATS};

/// Maintains per-recipient unread counters.
pub struct UnreadTracker {
    store: Arc<dyn RemoteStore>,
    repo: Arc<ConversationRepository>,
}

impl UnreadTracker {
    pub fn new(store: Arc<dyn RemoteStore>, repo: Arc<ConversationRepository>) -> Self {
        Self { store, repo }
    }

    /// Increment the counter of every participant except `sender` by one.
    /// Increments are independent requests; each failure is reported in
    /// [`ChatError::UnreadDelivery`] while the successful ones stand.
    pub async fn on_message_sent(&self, conversation: &Conversation, sender: &str) -> Result<()> {
        let recipients: BTreeSet<&str> = conversation
            .participants
            .iter()
            .map(String::as_str)
            .filter(|p| *p != sender)
            .collect();
        let results = join_all(recipients.iter().map(|uid| {
            let field = unread_field(uid);
            async move {
                let result = self.store.increment(CHATS, &conversation.id, &field, 1).await;
                (*uid, result)
            }
        }))
        .await;

        let mut delivered = Vec::new();
        let mut missed = Vec::new();
        for (uid, result) in results {
            match result {
                Ok(()) => {
                    self.repo.record_increment(&conversation.id, uid);
                    delivered.push(uid.to_string());
                }
                Err(err) => missed.push(MissedIncrement {
                    participant: uid.to_string(),
                    reason: err.to_string(),
                }),
            }
        }
        if missed.is_empty() {
            debug!(id = %conversation.id, recipients = delivered.len(), "unread counters incremented");
            return Ok(());
        }
        warn!(
            id = %conversation.id,
            missed = missed.len(),
            delivered = delivered.len(),
            "some unread counters were not incremented"
        );
        Err(ChatError::UnreadDelivery {
            conversation_id: conversation.id.clone(),
            delivered,
            missed,
        })
    }

    /// Clear the viewer's badge if it shows anything.
    pub async fn on_conversation_opened(&self, conversation: &Conversation) -> Result<()> {
        if conversation.unread_for(self.repo.viewer()) > 0 {
            self.repo.mark_read(&conversation.id).await?;
        }
        Ok(())
    }
}
