//! Immediate discipline against a simulated endpoint.
//!
//! Each dispatched call runs on its own timer once the key's not-before
//! point has passed. The fake server answers every third request with a
//! `Retry-After`, which pushes back the calls that were scheduled after it.

use call_governor::{CallLimiter, Discipline, HeaderReporter, Headers, Limit};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Pretend HTTP endpoint that asks callers to back off every third request.
fn fake_endpoint(hits: &AtomicU32) -> Headers {
    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
    if n % 3 == 0 {
        Headers::new().with("Retry-After", "1")
    } else {
        Headers::new()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let limiter = CallLimiter::new(Discipline::Immediate, Limit::Max(5_000))
        .expect("limit within range");
    let hits = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    println!("=== Immediate Discipline Example ===\n");
    println!("Limit: refuse calls that would wait longer than 5s\n");

    for round in 1..=6 {
        let hits = Arc::clone(&hits);
        let result = limiter.dispatch_with("GET /orders", move |reporter: &HeaderReporter| {
            let headers = fake_endpoint(&hits);
            let raised = reporter.report(&headers).is_some();
            println!(
                "  call {} ran at {:>5}ms (backoff requested: {})",
                round,
                start.elapsed().as_millis(),
                raised
            );
        });

        if let Err(e) = result {
            println!("  call {} refused: {}", round, e);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    println!("\nManual report outside of a call:");
    limiter.report_headers("GET /orders", &Headers::new().with("Retry-After", 30));
    match limiter.dispatch_with("GET /orders", |_: &HeaderReporter| {}) {
        Ok(()) => println!("  unexpectedly accepted"),
        Err(e) => println!("  refused: {}", e),
    }

    let snapshot = limiter.metrics().snapshot();
    println!("\n=== Metrics ===");
    println!("Dispatched:       {}", snapshot.calls_dispatched);
    println!("Executed:         {}", snapshot.calls_executed);
    println!("Limit exceeded:   {}", snapshot.limit_exceeded);
    println!("Hints applied:    {}", snapshot.hints_applied);
}
