//! Message processing: scope filter, exactly-once admission, gift extraction,
//! daily quota, ledger commit and channel notices.

pub mod intent;
pub mod notices;
pub mod quota;
pub mod timestamp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::cache::Leaderboard;
use crate::metrics::Metrics;
use crate::slack::{EventHandler, Notifier, SocketEvent};
use crate::store::SqliteStore;
use crate::types::{InboundMessage, LedgerEntry};

pub use intent::{extract_gifts, find_markers, find_mentions, Mention};
pub use quota::{check_quota, QuotaDecision};
pub use timestamp::{event_time, parse_native_ts};

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub channel_id: String,
    pub marker: String,
    pub max_per_day: i64,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Outside the watched channel, from a bot, or an edit/system subtype.
    OutOfScope,
    /// Already admitted by an earlier delivery.
    Duplicate,
    /// The admission marker could not be written; nothing else happened.
    AdmissionFailed,
    /// No marker was attributable to anyone.
    NoGifts,
    LimitReached,
    WouldExceed { remaining: i64 },
    /// The quota lookup failed after admission; the message is dropped.
    QuotaUnavailable,
    /// Recipients whose ledger rows were written, with their counts.
    Committed { recipients: Vec<(String, i64)> },
}

pub struct EventProcessor {
    config: ProcessorConfig,
    store: SqliteStore,
    notifier: Arc<dyn Notifier>,
    leaderboard: Option<Arc<Leaderboard>>,
    metrics: Metrics,
}

impl EventProcessor {
    pub fn new(
        config: ProcessorConfig,
        store: SqliteStore,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            leaderboard: None,
            metrics,
        }
    }

    pub fn with_leaderboard(mut self, leaderboard: Arc<Leaderboard>) -> Self {
        self.leaderboard = Some(leaderboard);
        self
    }

    fn in_scope(&self, msg: &InboundMessage) -> bool {
        msg.channel_id == self.config.channel_id
            && !msg.actor_id.is_empty()
            && msg.subtype.is_none()
    }

    pub async fn process_message(&self, msg: &InboundMessage) -> Outcome {
        self.process_message_at(msg, Utc::now()).await
    }

    /// Same as [`process_message`](Self::process_message) with an explicit
    /// wall clock, used when the message timestamp cannot be parsed.
    pub async fn process_message_at(&self, msg: &InboundMessage, now: DateTime<Utc>) -> Outcome {
        if !self.in_scope(msg) {
            return Outcome::OutOfScope;
        }

        let event_id = msg.event_id();
        match self.store.try_mark_event_processed(&event_id, now) {
            Ok(true) => self.metrics.inc_processed(),
            Ok(false) => {
                log::debug!("🔁 Duplicate delivery {} ignored", event_id);
                self.metrics.inc_duplicate();
                return Outcome::Duplicate;
            }
            Err(e) => {
                log::error!("❌ Failed to record event {}: {}", event_id, e);
                return Outcome::AdmissionFailed;
            }
        }

        let gifts = extract_gifts(&msg.text, &self.config.marker, &msg.actor_id);
        if gifts.is_empty() {
            return Outcome::NoGifts;
        }
        let requested: i64 = gifts.iter().map(|(_, count)| count).sum();

        let at = event_time(&msg.native_ts, now);
        let given_today = match self.store.given_on_day(&msg.actor_id, at.date_naive()) {
            Ok(n) => n,
            Err(e) => {
                log::error!("❌ Quota lookup failed for {}: {}", msg.actor_id, e);
                return Outcome::QuotaUnavailable;
            }
        };

        match check_quota(given_today, requested, self.config.max_per_day) {
            QuotaDecision::LimitReached => {
                log::info!(
                    "🚫 {} is at the daily limit ({} given today)",
                    msg.actor_id,
                    given_today
                );
                self.notify(&msg.channel_id, &notices::limit_reached(&msg.actor_id, self.config.max_per_day))
                    .await;
                return Outcome::LimitReached;
            }
            QuotaDecision::WouldExceed { remaining } => {
                log::info!(
                    "🚫 {} asked for {} with {} left today",
                    msg.actor_id,
                    requested,
                    remaining
                );
                self.notify(
                    &msg.channel_id,
                    &notices::would_exceed(&msg.actor_id, requested, remaining),
                )
                .await;
                return Outcome::WouldExceed { remaining };
            }
            QuotaDecision::Allowed => {}
        }

        let mut committed = Vec::with_capacity(gifts.len());
        for (recipient_id, count) in gifts {
            let entry = LedgerEntry {
                giver_id: msg.actor_id.clone(),
                recipient_id: recipient_id.clone(),
                ts: msg.native_ts.clone(),
                ts_rfc: at,
                count,
            };
            if let Err(e) = self.store.upsert_gift(&entry) {
                log::error!(
                    "❌ Failed to record {} -> {} ({}): {}",
                    msg.actor_id,
                    recipient_id,
                    count,
                    e
                );
                continue;
            }
            self.metrics.add_gifts(count as u64);
            committed.push((recipient_id, count));
        }

        for (recipient_id, count) in &committed {
            log::info!("🍺 {} -> {} x{}", msg.actor_id, recipient_id, count);
            self.notify(
                &msg.channel_id,
                &notices::confirmation(&msg.actor_id, recipient_id, *count),
            )
            .await;
        }

        if let Some(board) = &self.leaderboard {
            board.record_gifts(&msg.actor_id, &committed, now).await;
        }

        Outcome::Committed {
            recipients: committed,
        }
    }

    async fn notify(&self, channel_id: &str, text: &str) {
        if let Err(e) = self.notifier.post_message(channel_id, text).await {
            log::warn!("⚠️  Failed to post notice to {}: {}", channel_id, e);
            self.metrics.inc_notice_failure();
        }
    }
}

#[async_trait]
impl EventHandler for EventProcessor {
    async fn handle(&self, event: SocketEvent) {
        match event {
            SocketEvent::Message(msg) => {
                let outcome = self.process_message(&msg).await;
                log::debug!("Message {} -> {:?}", msg.event_id(), outcome);
            }
            SocketEvent::Disconnect { reason } => {
                log::info!("🔌 Server requested disconnect: {}", reason);
            }
            SocketEvent::Hello | SocketEvent::Ignored { .. } => {}
        }
    }
}
