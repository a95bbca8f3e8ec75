//! Domain types shared by the store, cache, processor and HTTP layers

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a gift a leaderboard or aggregate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Givers,
    Recipients,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Givers => "givers",
            Role::Recipients => "recipients",
        }
    }

    /// Ledger column holding the user id for this role.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Role::Givers => "giver_id",
            Role::Recipients => "recipient_id",
        }
    }
}

/// A user id paired with a cumulative count, ordered descending wherever returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCount {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub count: i64,
}

/// Cached display data for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    #[serde(rename = "real_name")]
    pub display_name: String,
    #[serde(rename = "profile_image")]
    pub avatar_url: String,
    #[serde(rename = "updated_at")]
    pub cached_at: DateTime<Utc>,
}

/// One gift row as written to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub giver_id: String,
    pub recipient_id: String,
    /// Platform-native `"<secs>.<fraction>"` timestamp, part of the uniqueness key.
    pub ts: String,
    pub ts_rfc: DateTime<Utc>,
    pub count: i64,
}

/// A channel message as handed to the event processor.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel_id: String,
    pub actor_id: String,
    pub subtype: Option<String>,
    pub text: String,
    pub native_ts: String,
    pub envelope_id: Option<String>,
}

impl InboundMessage {
    /// Stable identity for deduplication: the envelope id when the platform
    /// sent one, otherwise a key derived from channel, actor and timestamp.
    pub fn event_id(&self) -> String {
        match &self.envelope_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!(
                "msg|{}|{}|{}",
                self.channel_id, self.actor_id, self.native_ts
            ),
        }
    }
}

/// Inclusive calendar-day range in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub(crate) fn bounds(&self) -> (String, String) {
        (
            self.start.format("%Y-%m-%d").to_string(),
            self.end.format("%Y-%m-%d").to_string(),
        )
    }
}
