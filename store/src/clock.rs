use parking_lot::Mutex;
use time::OffsetDateTime;

/// Server-side clock handing out strictly increasing millisecond stamps, so
/// writes landing within the same millisecond still order deterministically.
#[derive(Default)]
pub struct ServerClock {
    last: Mutex<i64>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> i64 {
        let wall = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let mut last = self.last.lock();
        let next = wall.max(*last + 1);
        *last = next;
        next
    }
}
