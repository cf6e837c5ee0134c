//! Queue discipline: strictly ordered calls with a bounded backlog.
//!
//! One worker per key drains the queue. A hint reported by a call delays
//! the call after it, and a full queue refuses new work.

use call_governor::{CallLimiter, Discipline, HeaderReporter, Headers, Limit};
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // With the queue discipline the limit caps queue length, not delay.
    let limiter = CallLimiter::builder()
        .with_discipline(Discipline::Queue)
        .with_limit(Limit::Max(4))
        .build()
        .expect("valid configuration");
    let start = Instant::now();

    println!("=== Queue Discipline Example ===\n");
    println!("Queue capacity: 4 calls per key\n");

    for page in 1..=6 {
        let result = limiter.dispatch(
            "GET /search",
            move |reporter: &HeaderReporter| {
                println!("  page {} fetched at {:>5}ms", page, start.elapsed().as_millis());
                if page == 2 {
                    reporter.report(&Headers::new().with("Retry-After", "1.5"));
                }
            },
            move || println!("  queue drained after page {}", page),
        );

        match result {
            Ok(()) => println!("queued page {}", page),
            Err(e) => println!("page {} refused: {}", page, e),
        }
    }

    println!(
        "\nBacklog: {} calls, worker active: {}\n",
        limiter.queue_len("GET /search"),
        limiter.is_worker_active("GET /search")
    );

    tokio::time::sleep(Duration::from_secs(3)).await;

    let snapshot = limiter.metrics().snapshot();
    println!("\n=== Metrics ===");
    println!("Executed:      {}", snapshot.calls_executed);
    println!("Queue full:    {}", snapshot.queue_full);
    println!("Rejection rate: {:.1}%", snapshot.rejection_rate() * 100.0);
}
