//! Conversation sync and unread-count core of the chat client.
//!
//! [`ChatClient`] owns one logged-in session: the mirrored conversation
//! lists, the contact directory and the live subscriptions that keep them
//! current. The [`bridge`] module exposes it to a presentation layer.

pub mod bridge;
pub mod client;
pub mod config;
pub mod contacts;
pub mod conversations;
pub mod error;
pub mod feed;
pub mod model;
pub mod naming;
pub mod presence;
pub mod reads;
pub mod session;
pub mod sync;
pub mod view;

pub use client::{ChatClient, Update};
pub use error::{ChatError, MissedIncrement, Result};
pub use session::{Session, Settings};
