use store_api::StoreError;
use thiserror::Error;

/// A participant whose unread counter was not incremented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedIncrement {
    pub participant: String,
    pub reason: String,
}

/// Errors surfaced to the presentation layer.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Input rejected before any store call was made.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A referenced conversation or user does not exist.
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    /// A document exists under the id but belongs to someone else.
    #[error("conversation `{0}` belongs to other participants")]
    Conflict(String),

    /// The store failed or was unreachable.
    #[error("remote operation failed: {0}")]
    Remote(StoreError),

    /// The message was stored but some recipients' unread counters were not
    /// incremented.
    #[error("unread counters not updated for {} participant(s) of `{conversation_id}`", missed.len())]
    UnreadDelivery {
        conversation_id: String,
        delivered: Vec<String>,
        missed: Vec<MissedIncrement>,
    },
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Numeric code reported over the presentation bridge.
    pub fn code(&self) -> i32 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::UnreadDelivery { .. } => 207,
            Self::Remote(_) => 502,
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => Self::NotFound {
                kind: if collection == crate::model::USERS {
                    "user"
                } else if collection == crate::model::CHATS {
                    "conversation"
                } else {
                    "document"
                },
                id,
            },
            other => Self::Remote(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
