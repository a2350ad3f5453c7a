//! TideKV - Concurrency Demo
//!
//! Spins up inserting, querying and erasing workers against one shared store,
//! then logs the operation counters and the index sizes before and after the
//! sweeper has had a chance to compact.

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tidekv::{ExpirePolicy, PolicyHint, TtlStore};
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Demo configuration
struct Config {
    /// Workers per role (fill, query, clear)
    workers: usize,
    /// Operations per fill worker
    ops: usize,
    /// Keys are drawn from `0..key_space`
    key_space: u64,
    /// TTLs are drawn from `0..max_ttl_ms`
    max_ttl_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 10,
            ops: 10_000,
            key_space: 1_000,
            max_ttl_ms: 1_000,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--workers" | "-w" => {
                    config.workers = parse_value(&args, i, "--workers");
                    i += 2;
                }
                "--ops" | "-n" => {
                    config.ops = parse_value(&args, i, "--ops");
                    i += 2;
                }
                "--key-space" | "-k" => {
                    config.key_space = parse_value(&args, i, "--key-space");
                    i += 2;
                }
                "--max-ttl-ms" | "-t" => {
                    config.max_ttl_ms = parse_value(&args, i, "--max-ttl-ms");
                    i += 2;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("TideKV version {}", tidekv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        if config.key_space == 0 || config.max_ttl_ms == 0 {
            eprintln!("Error: --key-space and --max-ttl-ms must be positive");
            std::process::exit(1);
        }

        config
    }
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i + 1).map(|raw| raw.parse()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            eprintln!("Error: invalid value for {}", flag);
            std::process::exit(1);
        }
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
TideKV - Concurrent In-Memory TTL Map (demo)

USAGE:
    tidekv [OPTIONS]

OPTIONS:
    -w, --workers <N>        Workers per role (default: 10)
    -n, --ops <N>            Inserts per fill worker (default: 10000)
    -k, --key-space <N>      Keys are drawn from 0..N (default: 1000)
    -t, --max-ttl-ms <MS>    TTLs are drawn from 0..MS (default: 1000)
    -v, --version            Print version information
    -h, --help               Print this help message

Set RUST_LOG=tidekv=debug to watch the sweeper.
"#
    );
}

/// splitmix64; good enough to scatter demo keys.
struct DemoRng(u64);

impl DemoRng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}

type Store = TtlStore<u64, Bytes>;

/// A window reaching up to a second into the past and far into the future.
fn random_window(rng: &mut DemoRng) -> (Instant, Instant) {
    let now = Instant::now();
    let start = now
        .checked_sub(Duration::from_millis(rng.below(1_000)))
        .unwrap_or(now);
    let end = now + Duration::from_secs(rng.below(1_000));
    (start, end)
}

fn fill(store: &Store, rng: &mut DemoRng, config: &Config) {
    for _ in 0..config.ops {
        let key = rng.below(config.key_space);
        let value = Bytes::from(rng.below(1_000).to_string());
        store.insert(key, value, ExpirePolicy::millis(rng.below(config.max_ttl_ms)));

        let key = rng.below(config.key_space);
        let value = Bytes::from(rng.below(1_000).to_string());
        store.update_value(key, value, PolicyHint::Replace(ExpirePolicy::Never));
    }
}

fn query(store: &Store, rng: &mut DemoRng, config: &Config) -> usize {
    let mut seen = 0;
    for _ in 0..10 {
        if store.get_by_key(&rng.below(config.key_space)).is_some() {
            seen += 1;
        }
        seen += store.get_by_order(10, true).len();

        let (start, end) = random_window(rng);
        seen += store.get_by_time_range(start, end, true).len();
    }
    seen
}

fn clear(store: &Store, rng: &mut DemoRng, config: &Config) -> usize {
    let mut erased = 0;
    for _ in 0..100 {
        if store.erase_by_key(&rng.below(config.key_space)) {
            erased += 1;
        }
        erased += store.erase_by_order(1_000, true);

        let (start, end) = random_window(rng);
        erased += store.erase_by_time_range(start, end);
    }
    erased
}

fn log_sizes(store: &Store, label: &str) {
    let sizes = store.index_sizes();
    info!(
        table = sizes.table,
        sequence = sizes.sequence,
        heap = sizes.heap,
        "{}",
        label
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_args());

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .init();

    let store: Arc<Store> = Arc::new(TtlStore::new());
    info!(workers = config.workers, ops = config.ops, "Starting demo workers");

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for worker in 0..config.workers {
        for role in 0..3u64 {
            let store = Arc::clone(&store);
            let config = Arc::clone(&config);
            let seed = (worker as u64) * 3 + role;
            tasks.spawn_blocking(move || {
                let mut rng = DemoRng(seed);
                match role {
                    0 => {
                        fill(&store, &mut rng, &config);
                        0
                    }
                    1 => query(&store, &mut rng, &config),
                    _ => clear(&store, &mut rng, &config),
                }
            });
        }
    }

    while let Some(result) = tasks.join_next().await {
        result?;
    }

    let stats = store.stats();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        inserts = stats.inserts,
        updates = stats.updates,
        erased = stats.erased,
        lazily_expired = stats.lazily_expired,
        "Workers finished"
    );
    log_sizes(&store, "Index sizes after workers");

    // Long enough for a full sweep at the default cadence
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stats = store.stats();
    info!(
        incremental_sweeps = stats.incremental_sweeps,
        full_sweeps = stats.full_sweeps,
        reclaimed = stats.reclaimed,
        "Sweeper activity"
    );
    log_sizes(&store, "Index sizes after sweeping");

    drop(store);
    info!("Demo complete");
    Ok(())
}
