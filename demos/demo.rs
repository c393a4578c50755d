//! Demo application hammering a counter engine from many threads.
//!
//! Run with:
//! ```bash
//! cargo run --example demo --features demo -- --threads 8 --increments 100000
//! ```

use clap::{Parser, ValueEnum};
use contabile::backends::{MemoryCache, MemoryStore, WorkerDispatcher};
use contabile::clock::Clock;
use contabile::snapshot::{CountsSnapshot, JsonObserver};
use contabile::{CounterEngine, EngineConfig, FlushHandler, SystemClock};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Output format for the final counter report.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Compact JSON
    #[default]
    Json,
    /// Pretty-printed JSON
    Pretty,
    /// One `name:value` line per counter
    Plain,
}

/// Demo for contabile - write-buffered durable counters.
///
/// Spawns worker threads incrementing a set of counters through the
/// engine while a background dispatcher flushes them, then drains the
/// remainder and prints the final durable-consistent values.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of distinct counters
    #[arg(short, long, default_value = "4")]
    counters: usize,

    /// Number of incrementing threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Increments per thread
    #[arg(short, long, default_value = "10000")]
    increments: usize,

    /// Flush throttle interval in milliseconds (0 = write-through)
    #[arg(long, default_value = "50")]
    interval_ms: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config =
        EngineConfig::default().with_update_interval(Duration::from_millis(args.interval_ms));

    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let dispatcher = Arc::new(WorkerDispatcher::new());
    let engine = Arc::new(
        CounterEngine::new(store.clone(), cache, dispatcher.clone()).with_config(config),
    );

    let handler: Arc<dyn FlushHandler> = engine.clone();
    dispatcher.start(&handler);

    let names: Vec<String> = (0..args.counters.max(1))
        .map(|i| format!("counter_{i}"))
        .collect();

    let mut handles = vec![];
    for thread_id in 0..args.threads {
        let engine = Arc::clone(&engine);
        let names = names.clone();
        handles.push(thread::spawn(move || {
            for i in 0..args.increments {
                let name = &names[(thread_id + i) % names.len()];
                engine.incr(name).expect("increment failed");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("incrementer panicked");
    }

    // Let the in-flight jobs land, then drain what is still buffered.
    dispatcher.shutdown();
    for name in &names {
        engine.flush(name).expect("final flush failed");
    }

    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let snapshot = CountsSnapshot::capture(&engine, &name_refs)
        .expect("bulk read failed")
        .with_timestamp(SystemClock.now_millis());

    match args.format {
        OutputFormat::Json => {
            println!("{}", JsonObserver::new().render(&snapshot).expect("json"));
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                JsonObserver::new().pretty(true).render(&snapshot).expect("json")
            );
        }
        OutputFormat::Plain => {
            for counter in &snapshot.counters {
                println!("{}:{}", counter.name, counter.value);
            }
        }
    }

    let total: i64 = snapshot.counters.iter().map(|c| c.value).sum();
    let expected = (args.threads * args.increments) as i64;
    println!("# total {total} / expected {expected}");
}
