//! End-to-end message handling against a real SQLite file, an in-memory fast
//! cache and a recording notifier.

use async_trait::async_trait;
use beerbot::cache::{CircuitBreaker, FastCache, GuardedCache, Leaderboard, MemoryCache, RangeKey};
use beerbot::metrics::Metrics;
use beerbot::processor::{EventProcessor, Outcome, ProcessorConfig};
use beerbot::slack::{EventHandler, Notifier, SocketEvent, TransportError};
use beerbot::store::SqliteStore;
use beerbot::types::{InboundMessage, LedgerEntry, Role, UserCount};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct RecordingNotifier {
    posts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post_message(&self, _channel_id: &str, text: &str) -> Result<(), TransportError> {
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct Bot {
    dir: TempDir,
    store: SqliteStore,
    memory: Arc<MemoryCache>,
    notifier: Arc<RecordingNotifier>,
    metrics: Metrics,
    processor: Arc<EventProcessor>,
}

fn bot(marker: &str) -> Bot {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("beer.db")).unwrap();
    let memory = Arc::new(MemoryCache::new());
    let cache = Arc::new(GuardedCache::new(memory.clone(), CircuitBreaker::default()));
    let notifier = Arc::new(RecordingNotifier::default());
    let metrics = Metrics::new("C1");
    let processor = EventProcessor::new(
        ProcessorConfig {
            channel_id: "C1".to_string(),
            marker: marker.to_string(),
            max_per_day: 10,
        },
        store.clone(),
        notifier.clone(),
        metrics.clone(),
    )
    .with_leaderboard(Arc::new(Leaderboard::new(cache, store.clone())));

    Bot {
        dir,
        store,
        memory,
        notifier,
        metrics,
        processor: Arc::new(processor),
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap()
}

fn message(text: &str, ts: &str, envelope_id: Option<&str>) -> InboundMessage {
    InboundMessage {
        channel_id: "C1".to_string(),
        actor_id: "UA".to_string(),
        subtype: None,
        text: text.to_string(),
        native_ts: ts.to_string(),
        envelope_id: envelope_id.map(str::to_string),
    }
}

fn ts_at(at: DateTime<Utc>, suffix: &str) -> String {
    format!("{}.{}", at.timestamp(), suffix)
}

#[tokio::test]
async fn test_gifts_split_between_recipients() {
    let bot = bot("🍺");
    let msg = message("thanks <@U1> 🍺🍺 and <@U2> 🍺", &ts_at(noon(), "000100"), Some("env-1"));

    let outcome = bot.processor.process_message_at(&msg, noon()).await;
    assert_eq!(
        outcome,
        Outcome::Committed {
            recipients: vec![("U1".to_string(), 2), ("U2".to_string(), 1)]
        }
    );

    let entries = bot.store.entries_by_giver("UA").unwrap();
    let mut pairs: Vec<(String, i64)> = entries
        .iter()
        .map(|e| (e.recipient_id.clone(), e.count))
        .collect();
    pairs.sort();
    assert_eq!(pairs, vec![("U1".to_string(), 2), ("U2".to_string(), 1)]);

    assert_eq!(
        bot.notifier.posts(),
        vec![
            "<@UA> gave 2 beers to <@U1>!".to_string(),
            "<@UA> gave 1 beer to <@U2>!".to_string(),
        ]
    );

    let givers = bot.memory.top(Role::Givers, RangeKey::Today, 10).await.unwrap();
    assert_eq!(givers, vec![UserCount { user_id: "UA".to_string(), count: 3 }]);
    assert_eq!(bot.metrics.gifts_committed(), 3);
}

#[tokio::test]
async fn test_redelivery_has_no_further_effect() {
    let bot = bot(":beer:");
    let msg = message("<@UB> :beer:", &ts_at(noon(), "000100"), Some("env-7"));

    assert!(matches!(
        bot.processor.process_message_at(&msg, noon()).await,
        Outcome::Committed { .. }
    ));
    assert_eq!(bot.processor.process_message_at(&msg, noon()).await, Outcome::Duplicate);

    // Same message through the socket handler path.
    bot.processor.handle(SocketEvent::Message(msg.clone())).await;

    assert_eq!(bot.store.entries_by_giver("UA").unwrap().len(), 1);
    assert_eq!(bot.notifier.posts().len(), 1);
    assert_eq!(bot.metrics.duplicates(), 2);
    assert!(bot
        .metrics
        .render_prometheus()
        .contains("bwm_messages_processed_total{channel=\"C1\"} 1"));
}

#[tokio::test]
async fn test_request_over_remaining_quota_is_refused_whole() {
    let bot = bot(":beer:");
    bot.store
        .upsert_gift(&LedgerEntry {
            giver_id: "UA".to_string(),
            recipient_id: "UZ".to_string(),
            ts: ts_at(noon(), "000001"),
            ts_rfc: noon(),
            count: 9,
        })
        .unwrap();

    let msg = message("<@UB> :beer: :beer:", &ts_at(noon(), "000200"), None);
    assert_eq!(
        bot.processor.process_message_at(&msg, noon()).await,
        Outcome::WouldExceed { remaining: 1 }
    );
    assert_eq!(
        bot.notifier.posts(),
        vec!["Sorry <@UA>, you are trying to give 2 beers, but you only have 1 left for today."
            .to_string()]
    );
    assert_eq!(bot.store.given_on_day("UA", noon().date_naive()).unwrap(), 9);

    // One still fits.
    let msg = message("<@UB> :beer:", &ts_at(noon(), "000300"), None);
    assert!(matches!(
        bot.processor.process_message_at(&msg, noon()).await,
        Outcome::Committed { .. }
    ));
    assert_eq!(bot.store.given_on_day("UA", noon().date_naive()).unwrap(), 10);
}

#[tokio::test]
async fn test_unattributable_markers_do_nothing() {
    let bot = bot(":beer:");

    let own = message("<@UA> :beer: :beer:", &ts_at(noon(), "000100"), None);
    assert_eq!(bot.processor.process_message_at(&own, noon()).await, Outcome::NoGifts);

    let early = message(":beer: thanks <@UB>", &ts_at(noon(), "000200"), None);
    assert_eq!(bot.processor.process_message_at(&early, noon()).await, Outcome::NoGifts);

    assert!(bot.store.entries_by_giver("UA").unwrap().is_empty());
    assert!(bot.notifier.posts().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_commit_once() {
    let bot = bot(":beer:");
    let msg = message("<@UB> :beer: :beer:", &ts_at(noon(), "000100"), Some("env-race"));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let processor = bot.processor.clone();
        let msg = msg.clone();
        handles.push(tokio::spawn(async move {
            processor.process_message_at(&msg, noon()).await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Outcome::Committed { .. } => committed += 1,
            Outcome::Duplicate => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(bot.store.given_on_day("UA", noon().date_naive()).unwrap(), 2);
    assert_eq!(bot.notifier.posts().len(), 1);
}

#[tokio::test]
async fn test_ledger_survives_reopen() {
    let bot = bot(":beer:");
    let msg = message("<@UB> :beer:", &ts_at(noon(), "000100"), Some("env-1"));
    bot.processor.process_message_at(&msg, noon()).await;

    let path = bot.dir.path().join("beer.db");
    let reopened = SqliteStore::open(&path).unwrap();
    assert!(reopened.is_event_processed("env-1").unwrap());
    assert_eq!(reopened.entries_by_giver("UA").unwrap()[0].count, 1);
}
