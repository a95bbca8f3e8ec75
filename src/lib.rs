//! beerbot: gift-ledger bot for Slack Socket Mode
//!
//! A single channel is watched for messages of the form `<@U123> :beer: :beer:`.
//! Every delivery is admitted at most once, gifts are checked against a daily
//! per-giver quota, written to SQLite and mirrored into a fast leaderboard cache.

pub mod cache;
pub mod config;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod slack;
pub mod sqlite_pragma;
pub mod store;
pub mod types;
