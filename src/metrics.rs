//! Process counters rendered in Prometheus text format

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    messages_processed_total: Arc<AtomicU64>,
    duplicate_events_total: Arc<AtomicU64>,
    gifts_committed_total: Arc<AtomicU64>,
    notices_failed_total: Arc<AtomicU64>,
    reconnects_total: Arc<AtomicU64>,
    probe_failures_total: Arc<AtomicU64>,
    cache_failures_total: Arc<AtomicU64>,
    slack_connected: Arc<AtomicBool>,
    channel: String,
}

impl Metrics {
    pub fn new(channel: impl Into<String>) -> Self {
        Metrics {
            messages_processed_total: Arc::new(AtomicU64::new(0)),
            duplicate_events_total: Arc::new(AtomicU64::new(0)),
            gifts_committed_total: Arc::new(AtomicU64::new(0)),
            notices_failed_total: Arc::new(AtomicU64::new(0)),
            reconnects_total: Arc::new(AtomicU64::new(0)),
            probe_failures_total: Arc::new(AtomicU64::new(0)),
            cache_failures_total: Arc::new(AtomicU64::new(0)),
            slack_connected: Arc::new(AtomicBool::new(false)),
            channel: channel.into(),
        }
    }

    pub fn inc_processed(&self) {
        self.messages_processed_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_duplicate(&self) {
        self.duplicate_events_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_gifts(&self, n: u64) {
        self.gifts_committed_total.fetch_add(n, Ordering::Relaxed);
    }
    pub fn inc_notice_failure(&self) {
        self.notices_failed_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_reconnect(&self) {
        self.reconnects_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_probe_failure(&self) {
        self.probe_failures_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_cache_failure(&self) {
        self.cache_failures_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn set_connected(&self, v: bool) {
        self.slack_connected.store(v, Ordering::Relaxed);
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicate_events_total.load(Ordering::Relaxed)
    }
    pub fn gifts_committed(&self) -> u64 {
        self.gifts_committed_total.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut s = String::with_capacity(1024);
        let _ = writeln!(s, "# HELP beerbot_build_info Build information");
        let _ = writeln!(s, "# TYPE beerbot_build_info gauge");
        let _ = writeln!(
            s,
            "beerbot_build_info{{name=\"{}\",version=\"{}\"}} 1",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );

        let channel = format!("channel=\"{}\"", self.channel);
        counter(
            &mut s,
            "bwm_messages_processed_total",
            "Channel messages admitted for processing",
            Some(&channel),
            &self.messages_processed_total,
        );
        counter(
            &mut s,
            "beerbot_duplicate_events_total",
            "Deliveries rejected as already processed",
            None,
            &self.duplicate_events_total,
        );
        counter(
            &mut s,
            "beerbot_gifts_committed_total",
            "Gift units written to the ledger",
            None,
            &self.gifts_committed_total,
        );
        counter(
            &mut s,
            "beerbot_notices_failed_total",
            "Channel notices that could not be posted",
            None,
            &self.notices_failed_total,
        );
        counter(
            &mut s,
            "beerbot_reconnects_total",
            "Socket reconnect attempts",
            None,
            &self.reconnects_total,
        );
        counter(
            &mut s,
            "beerbot_probe_failures_total",
            "Failed liveness probes",
            None,
            &self.probe_failures_total,
        );
        counter(
            &mut s,
            "beerbot_cache_failures_total",
            "Fast cache operations that failed",
            None,
            &self.cache_failures_total,
        );

        let _ = writeln!(s, "# HELP beerbot_slack_connected Socket session connected");
        let _ = writeln!(s, "# TYPE beerbot_slack_connected gauge");
        let _ = writeln!(
            s,
            "beerbot_slack_connected {}",
            if self.slack_connected.load(Ordering::Relaxed) { 1 } else { 0 }
        );
        s
    }
}

fn counter(s: &mut String, name: &str, help: &str, labels: Option<&str>, value: &AtomicU64) {
    let _ = writeln!(s, "# HELP {} {}", name, help);
    let _ = writeln!(s, "# TYPE {} counter", name);
    match labels {
        Some(labels) => {
            let _ = writeln!(s, "{}{{{}}} {}", name, labels, value.load(Ordering::Relaxed));
        }
        None => {
            let _ = writeln!(s, "{} {}", name, value.load(Ordering::Relaxed));
        }
    }
}
