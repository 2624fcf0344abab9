use parking_lot::Mutex;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::model::User;

/// Query caps and locale settings of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Conversations fetched per list.
    pub page_size: usize,
    /// Messages fetched when a conversation is opened.
    pub feed_limit: usize,
    /// Users loaded into the contact list.
    pub contacts_limit: usize,
    /// Results per search query (username and phone each).
    pub search_limit: usize,
    /// Viewer's offset from UTC, used for calendar days and clock labels.
    pub utc_offset: UtcOffset,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: 20,
            feed_limit: 100,
            contacts_limit: 50,
            search_limit: 10,
            utc_offset: UtcOffset::UTC,
        }
    }
}

/// Everything tied to one logged-in user, from login until logout.
pub struct Session {
    user: User,
    settings: Settings,
    current: Mutex<Option<String>>,
}

impl Session {
    pub fn new(user: User, settings: Settings) -> Self {
        Self {
            user,
            settings,
            current: Mutex::new(None),
        }
    }

    pub fn viewer(&self) -> &str {
        &self.user.uid
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Id of the conversation currently on screen.
    pub fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }

    pub fn set_current(&self, id: Option<String>) {
        *self.current.lock() = id;
    }

    pub fn is_current(&self, id: &str) -> bool {
        self.current.lock().as_deref() == Some(id)
    }

    pub fn now_ms(&self) -> i64 {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Today's date in the viewer's time zone.
    pub fn today(&self) -> Date {
        OffsetDateTime::now_utc()
            .to_offset(self.settings.utc_offset)
            .date()
    }
}
