//! beerbot - gift-tracking chat bot
//!
//! Wires the Socket Mode connection, the event processor, the tiered cache
//! and the read-only HTTP API together, then runs until CTRL+C.
//!
//! Usage:
//!   beerbot --channel C0123 --emoji :beer: --max-per-day 10 --db beerbot.db --addr :8080
//!
//! Environment variables:
//!   BOT_TOKEN, APP_TOKEN, CHANNEL - required
//!   CACHE_BACKEND - redis | memory | none (default: redis)
//!   REDIS_ADDR - fast cache address (default: redis://cache:6379)
//!   API_TOKEN - bearer token for /api/* (default: open)

use beerbot::cache::{CircuitBreaker, FastCache, GuardedCache, Leaderboard, MemoryCache, ProfileResolver, RedisCache};
use beerbot::config::{CacheBackend, Config};
use beerbot::http::{self, AppState};
use beerbot::logging;
use beerbot::metrics::Metrics;
use beerbot::processor::{EventProcessor, ProcessorConfig};
use beerbot::slack::backoff::ReconnectBackoff;
use beerbot::slack::probe::spawn_liveness_probe;
use beerbot::slack::socket::SocketModeTransport;
use beerbot::slack::{ConnectionManager, SlackApi};
use beerbot::store::SqliteStore;
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("❌ Configuration error: {}", e);
            return Err(e.into());
        }
    };
    logging::init(&config.log_level);

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    info!("🚀 Starting beerbot v{}", env!("CARGO_PKG_VERSION"));
    info!("   ├─ Channel: {}", config.channel_id);
    info!("   ├─ Marker: {}", config.marker);
    info!("   ├─ Daily limit: {}", config.max_per_day);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Listen: {}", config.listen_addr);
    info!(
        "   └─ API auth: {}",
        if config.api_token.is_some() { "bearer token" } else { "open" }
    );

    let metrics = Metrics::new(config.channel_id.clone());

    info!("🔧 Opening database...");
    let store = SqliteStore::open(&config.db_path)?;
    info!("✅ Database ready");

    let cache = Arc::new(build_cache(&config).with_metrics(metrics.clone()));
    if cache.is_enabled() {
        if cache.ping().await {
            info!("✅ Fast cache reachable");
        } else {
            warn!("⚠️  Fast cache not reachable at startup, continuing with durable store reads");
        }
    }

    let api = Arc::new(SlackApi::new(
        &config.slack_api_base,
        &config.bot_token,
        &config.app_token,
    )?);
    let transport = Arc::new(SocketModeTransport::new(api.clone()));
    let manager = Arc::new(
        ConnectionManager::new(transport, ReconnectBackoff::default()).with_metrics(metrics.clone()),
    );

    let leaderboard = Arc::new(Leaderboard::new(cache.clone(), store.clone()));
    let profiles = Arc::new(ProfileResolver::new(cache.clone(), store.clone(), api.clone()));
    let processor = Arc::new(
        EventProcessor::new(
            ProcessorConfig {
                channel_id: config.channel_id.clone(),
                marker: config.marker.clone(),
                max_per_day: config.max_per_day,
            },
            store.clone(),
            api.clone(),
            metrics.clone(),
        )
        .with_leaderboard(leaderboard.clone()),
    );

    let shutdown = CancellationToken::new();

    info!("🚀 Spawning background tasks...");
    let run_manager = manager.clone();
    let run_shutdown = shutdown.clone();
    let connection_task = tokio::spawn(async move {
        run_manager.run(processor, run_shutdown).await;
    });
    info!("   ├─ ✅ Socket Mode connection manager");

    let probe_task = spawn_liveness_probe(
        manager.clone(),
        config.probe_interval,
        metrics.clone(),
        shutdown.clone(),
    );
    info!("   ├─ ✅ Liveness probe (every {}s)", config.probe_interval.as_secs());

    let sync_task = leaderboard
        .clone()
        .spawn_sync(config.cache_sync_interval, shutdown.clone());
    info!("   └─ ✅ Leaderboard sync (every {}s)", config.cache_sync_interval.as_secs());

    let state = AppState {
        store,
        profiles,
        leaderboard,
        connection: manager,
        metrics,
    };
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("🌐 HTTP API listening on {}", config.listen_addr);
    let http_task = tokio::spawn(http::serve(
        listener,
        http::router(state, config.api_token.clone()),
        shutdown.clone(),
    ));

    info!("🔄 Press CTRL+C to shutdown gracefully");
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }
    shutdown.cancel();

    match tokio::time::timeout(config.shutdown_grace, http_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("❌ HTTP server error: {}", e),
        Ok(Err(e)) => error!("❌ HTTP server task failed: {}", e),
        Err(_) => warn!(
            "⚠️  HTTP server did not drain within {}s",
            config.shutdown_grace.as_secs()
        ),
    }
    for task in [connection_task, probe_task, sync_task] {
        if let Err(e) = task.await {
            error!("❌ Background task failed: {}", e);
        }
    }

    info!("✅ beerbot stopped");
    Ok(())
}

fn build_cache(config: &Config) -> GuardedCache {
    let backend: Arc<dyn FastCache> = match config.cache_backend {
        CacheBackend::Disabled => {
            info!("💾 Fast cache: disabled (durable store only)");
            return GuardedCache::disabled();
        }
        CacheBackend::Memory => {
            info!("💾 Fast cache: in-process memory");
            Arc::new(MemoryCache::new())
        }
        CacheBackend::Redis => match RedisCache::new(&config.redis_url) {
            Ok(redis) => {
                info!("💾 Fast cache: redis at {}", config.redis_url);
                Arc::new(redis)
            }
            Err(e) => {
                warn!("⚠️  Invalid redis address {}: {} (fast cache disabled)", config.redis_url, e);
                return GuardedCache::disabled();
            }
        },
    };
    GuardedCache::new(backend, CircuitBreaker::default())
}
