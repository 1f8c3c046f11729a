//! kvsession - Session Store Soak Runner
//!
//! Runs the session backend against the in-memory engine: writes batches of
//! sessions with mixed expirations and lets the reaper clean up after them,
//! logging what it sees until Ctrl+C.

use chrono::{Duration as ChronoDuration, Utc};
use kvsession::config::{ExpirationPolicy, StoreConfig};
use kvsession::reaper::{Always, ElectionGuard, EnvRole};
use kvsession::session::SessionRecord;
use kvsession::storage::MemoryStore;
use kvsession::SessionBackend;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable holding this worker's index in a pool.
const WORKER_ID_VAR: &str = "KVSESSION_WORKER_ID";

/// Runner configuration
struct Config {
    /// Backend configuration
    store: StoreConfig,
    /// Sessions written per batch
    batch_size: u64,
    /// Pause between batches
    write_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default().with_reap_interval(Duration::from_secs(1)),
            batch_size: 100,
            write_interval: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| anyhow::anyhow!("{name} requires a value"))
            };

            match arg.as_str() {
                "--config" | "-c" => {
                    let path = value("--config")?;
                    let json = std::fs::read_to_string(&path)?;
                    config.store = StoreConfig::from_json(&json)?;
                }
                "--bucket" | "-b" => {
                    config.store.bucket = value("--bucket")?;
                }
                "--reap-interval-ms" | "-r" => {
                    config.store.reap_interval_ms = value("--reap-interval-ms")?.parse()?;
                }
                "--default-ttl-secs" => {
                    let secs: u64 = value("--default-ttl-secs")?.parse()?;
                    config.store.default_expiration = if secs == 0 {
                        ExpirationPolicy::None
                    } else {
                        ExpirationPolicy::FixedTtl(Duration::from_secs(secs))
                    };
                }
                "--batch-size" | "-n" => {
                    config.batch_size = value("--batch-size")?.parse()?;
                }
                "--write-interval-ms" | "-w" => {
                    config.write_interval = Duration::from_millis(value("--write-interval-ms")?.parse()?);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("kvsession version {}", kvsession::VERSION);
                    std::process::exit(0);
                }
                other => {
                    print_help();
                    anyhow::bail!("unknown argument: {other}");
                }
            }
        }

        config.store.validate()?;
        if config.write_interval.is_zero() {
            anyhow::bail!("--write-interval-ms must be greater than zero");
        }
        Ok(config)
    }
}

fn print_help() {
    println!(
        r#"
kvsession - Session Store Soak Runner

USAGE:
    kvsession [OPTIONS]

OPTIONS:
    -c, --config <FILE>              JSON store configuration
    -b, --bucket <NAME>              Session bucket (default: _sessions)
    -r, --reap-interval-ms <MS>      Reaper period, 0 disables (default: 1000)
        --default-ttl-secs <SECS>    TTL for sessions without expiry, 0 = never reap
    -n, --batch-size <N>             Sessions written per batch (default: 100)
    -w, --write-interval-ms <MS>     Pause between batches (default: 500)
    -v, --version                    Print version information
    -h, --help                       Print this help message

ENVIRONMENT:
    KVSESSION_WORKER_ID    When set, only worker "0" runs the reaper
    RUST_LOG               Log filter (default: info)
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args()?;

    // Set up logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let guard: Arc<dyn ElectionGuard> = match std::env::var(WORKER_ID_VAR) {
        Ok(_) => Arc::new(EnvRole::new(WORKER_ID_VAR, "0")),
        Err(_) => Arc::new(Always),
    };

    let store = Arc::new(MemoryStore::from_options(&config.store.client_options));
    let backend = SessionBackend::start(store.clone(), &config.store, guard);
    info!(
        version = kvsession::VERSION,
        bucket = %config.store.bucket,
        reaping = backend.is_reaping(),
        "Session backend started"
    );
    if !backend.is_reaping() {
        warn!("Reaper not armed in this process, expired sessions will accumulate");
    }

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping...");
    };

    tokio::select! {
        _ = write_loop(&backend, store.clone(), &config) => {}
        _ = shutdown => {}
    }

    info!(stats = ?store.stats(), "Soak run complete");
    Ok(())
}

/// Writes batches of sessions forever. Every other session is already
/// expired, every fifth has no expiry at all.
async fn write_loop(backend: &SessionBackend, store: Arc<MemoryStore>, config: &Config) {
    let repository = backend.repository();
    let mut written = 0u64;

    loop {
        let now = Utc::now();

        for _ in 0..config.batch_size {
            let id = format!("sess:{written}");
            let mut record = SessionRecord::new(json!({"n": written}));

            if written % 5 != 0 {
                let offset = if written % 2 == 0 {
                    ChronoDuration::seconds(-60)
                } else {
                    ChronoDuration::seconds(3600)
                };
                record = record.expiring_at(now + offset);
            }

            if let Err(e) = repository.set(&id, &record).await {
                error!(session = %id, error = %e, "Failed to write session");
            }
            written += 1;
        }

        let stats = store.stats();
        debug!(
            written,
            stored = stats.objects,
            indexed = stats.index_entries,
            sweeps = backend.reaper_handle().map(|h| h.sweeps()).unwrap_or(0),
            "Batch written"
        );

        tokio::time::sleep(config.write_interval).await;
    }
}
