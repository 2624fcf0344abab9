use std::sync::Arc;

use store_api::{Direction, Query, RemoteStore};
use time::{Date, Month, OffsetDateTime, UtcOffset};
use tracing::debug;

use crate::error::Result;
use crate::model::{messages_collection, Message};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Loads the message history of one conversation.
pub struct FeedLoader {
    store: Arc<dyn RemoteStore>,
    limit: usize,
}

impl FeedLoader {
    pub fn new(store: Arc<dyn RemoteStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Oldest-first snapshot of up to `limit` messages. Every call reloads
    /// from the start.
    pub async fn load(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let query = Query::new()
            .order_by("timestamp", Direction::Asc)
            .limit(self.limit);
        let docs = self
            .store
            .query(&messages_collection(conversation_id), &query)
            .await?;
        let messages = docs
            .iter()
            .map(|d| d.decode::<Message>())
            .collect::<store_api::Result<Vec<_>>>()?;
        debug!(conversation_id, count = messages.len(), "feed loaded");
        Ok(messages)
    }
}

/// Calendar-day boundary shown above the first message of each day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayMarker {
    pub date: Date,
    pub is_today: bool,
}

impl DayMarker {
    pub fn label(&self) -> String {
        if self.is_today {
            "Today".to_string()
        } else {
            format!(
                "{:02}.{:02}.{}",
                self.date.day(),
                u8::from(self.date.month()),
                self.date.year()
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Day(DayMarker),
    Message(Message),
}

fn at(ts_ms: i64, offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts_ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset)
}

/// Calendar date of `ts_ms` at `offset`.
pub fn local_date(ts_ms: i64, offset: UtcOffset) -> Date {
    at(ts_ms, offset).date()
}

/// Interleave day markers with `messages`, which must already be in
/// timestamp order. The first message always gets a marker.
pub fn group_by_day(messages: Vec<Message>, offset: UtcOffset, today: Date) -> Vec<FeedItem> {
    let mut items = Vec::with_capacity(messages.len() + 1);
    let mut previous: Option<Date> = None;
    for message in messages {
        let date = local_date(message.timestamp, offset);
        if previous != Some(date) {
            items.push(FeedItem::Day(DayMarker {
                date,
                is_today: date == today,
            }));
            previous = Some(date);
        }
        items.push(FeedItem::Message(message));
    }
    items
}

/// `HH:MM` label of a message.
pub fn format_clock(ts_ms: i64, offset: UtcOffset) -> String {
    let t = at(ts_ms, offset);
    format!("{:02}:{:02}", t.hour(), t.minute())
}

/// Chat-list label: clock time for the last 24 hours, `D Mon` before that.
pub fn format_list_time(ts_ms: i64, now_ms: i64, offset: UtcOffset) -> String {
    if now_ms - ts_ms < DAY_MS {
        return format_clock(ts_ms, offset);
    }
    let t = at(ts_ms, offset);
    format!("{} {}", t.day(), short_month(t.month()))
}

fn short_month(month: Month) -> &'static str {
    match month {
        Month::January => "Jan",
        Month::February => "Feb",
        Month::March => "Mar",
        Month::April => "Apr",
        Month::May => "May",
        Month::June => "Jun",
        Month::July => "Jul",
        Month::August => "Aug",
        Month::September => "Sep",
        Month::October => "Oct",
        Month::November => "Nov",
        Month::December => "Dec",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageKind;

    // 2024-03-01T00:00:00Z
    const MARCH_1: i64 = 1_709_251_200_000;
    const HOUR: i64 = 60 * 60 * 1000;

    fn msg(id: &str, timestamp: i64) -> Message {
        Message {
            id: id.into(),
            chat_id: "c1".into(),
            sender_id: "alice".into(),
            text: id.into(),
            timestamp,
            kind: MessageKind::Text,
        }
    }

    fn date(y: i32, m: Month, d: u8) -> Date {
        Date::from_calendar_date(y, m, d).unwrap()
    }

    #[test]
    fn markers_precede_first_message_of_each_day() {
        let messages = vec![
            msg("m1", MARCH_1 + 10 * HOUR),
            msg("m2", MARCH_1 + 14 * HOUR),
            msg("m3", MARCH_1 + DAY_MS + 9 * HOUR),
        ];
        let items = group_by_day(messages, UtcOffset::UTC, date(2024, Month::March, 2));
        assert_eq!(items.len(), 5);
        match &items[0] {
            FeedItem::Day(day) => {
                assert_eq!(day.date, date(2024, Month::March, 1));
                assert!(!day.is_today);
                assert_eq!(day.label(), "01.03.2024");
            }
            other => panic!("expected marker, got {other:?}"),
        }
        assert!(matches!(&items[1], FeedItem::Message(m) if m.id == "m1"));
        assert!(matches!(&items[2], FeedItem::Message(m) if m.id == "m2"));
        match &items[3] {
            FeedItem::Day(day) => {
                assert!(day.is_today);
                assert_eq!(day.label(), "Today");
            }
            other => panic!("expected marker, got {other:?}"),
        }
        assert!(matches!(&items[4], FeedItem::Message(m) if m.id == "m3"));
    }

    #[test]
    fn offset_moves_messages_across_midnight() {
        let late = msg("late", MARCH_1 + 23 * HOUR);
        let offset = UtcOffset::from_hms(2, 0, 0).unwrap();
        assert_eq!(local_date(late.timestamp, offset), date(2024, Month::March, 2));
        assert_eq!(format_clock(late.timestamp, offset), "01:00");
    }

    #[test]
    fn empty_feed_has_no_markers() {
        assert!(group_by_day(vec![], UtcOffset::UTC, date(2024, Month::March, 1)).is_empty());
    }

    #[test]
    fn list_time_switches_after_a_day() {
        let ts = MARCH_1 + 9 * HOUR + 5 * 60 * 1000;
        assert_eq!(format_list_time(ts, ts + HOUR, UtcOffset::UTC), "09:05");
        assert_eq!(format_list_time(ts, ts + 2 * DAY_MS, UtcOffset::UTC), "1 Mar");
    }
}
