//! Deferred discipline: await the outcome of a rate-limited async call.

use call_governor::{CallLimiter, DeferredError, Discipline, Headers, Limit, Resolver};
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Reply {
    status: u16,
    retry_after: Option<u64>,
}

/// Simulated remote call: the first attempt is throttled.
async fn remote_call(attempt: u32) -> Reply {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if attempt == 1 {
        Reply {
            status: 429,
            retry_after: Some(1),
        }
    } else {
        Reply {
            status: 200,
            retry_after: None,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let limiter = CallLimiter::new(Discipline::Deferred, Limit::Max(10_000))
        .expect("limit within range");

    println!("=== Deferred Discipline Example ===\n");

    for attempt in 1..=3 {
        let outcome = limiter
            .dispatch_deferred("POST /upload", move |resolver: Resolver<u16, String>, reporter| {
                tokio::spawn(async move {
                    let reply = remote_call(attempt).await;
                    if let Some(secs) = reply.retry_after {
                        reporter.report(&Headers::new().with("Retry-After", secs));
                        resolver.reject(format!("throttled with status {}", reply.status));
                    } else {
                        resolver.resolve(reply.status);
                    }
                });
            })
            .await;

        match outcome {
            Ok(status) => println!("attempt {}: status {}", attempt, status),
            Err(DeferredError::Rejected(reason)) => println!("attempt {}: {}", attempt, reason),
            Err(e) => println!("attempt {}: failed: {}", attempt, e),
        }
    }

    println!("\nForgetting the resolver:");
    let abandoned = limiter
        .dispatch_deferred("POST /upload", |_resolver: Resolver<u16, String>, _reporter| {})
        .await;
    println!("  outcome: {:?}", abandoned);
}
