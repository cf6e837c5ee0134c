use call_governor::{
    CallLimiter, Discipline, HeaderReporter, Headers, HintParser, Limit,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap()
}

/// Benchmark hint parsing for the different header shapes
fn bench_hint_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("hint_parsing");
    let parser = HintParser::new();
    let aliased = HintParser::new().with_retry_after_aliases(["x-backoff", "x-wait", "retry-after"]);
    let now = Instant::now();
    let wall = SystemTime::now();

    let cases = [
        ("relative_number", Headers::new().with("Retry-After", 2)),
        ("relative_text", Headers::new().with("Retry-After", "2.5")),
        (
            "http_date",
            Headers::new().with("Retry-After", "Fri, 31 Dec 2027 23:59:59 GMT"),
        ),
        ("absent", Headers::new().with("Content-Type", "application/json")),
    ];

    for (name, headers) in &cases {
        group.bench_with_input(BenchmarkId::new("default", name), headers, |b, headers| {
            b.iter(|| black_box(parser.parse(black_box(headers), now, wall)))
        });
    }

    let last_alias = Headers::new().with("Retry-After", 2);
    group.bench_function("third_alias", |b| {
        b.iter(|| black_box(aliased.parse(black_box(&last_alias), now, wall)))
    });

    group.finish();
}

/// Benchmark the synchronous limit check on keys that are over their limit
fn bench_rejections(c: &mut Criterion) {
    let mut group = c.benchmark_group("rejections");
    group.throughput(Throughput::Elements(1000));
    let rt = runtime();

    for keys in [1usize, 10, 1000] {
        group.bench_with_input(BenchmarkId::new("keys", keys), &keys, |b, &keys| {
            let limiter = CallLimiter::builder()
                .with_limit(Limit::Max(10))
                .with_runtime(rt.handle().clone())
                .build()
                .unwrap();
            let names: Vec<String> = (0..keys).map(|i| format!("GET /resource/{}", i)).collect();
            for name in &names {
                limiter.report_headers(name, &Headers::new().with("Retry-After", 3_600));
            }

            b.iter(|| {
                for i in 0..1000 {
                    let key = &names[i % keys];
                    let _ = black_box(limiter.dispatch_with(key, |_: &HeaderReporter| {}));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark concurrent header reports from several threads
fn bench_concurrent_reports(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_reports");
    let rt = runtime();

    for num_threads in [2, 4, 8] {
        group.throughput(Throughput::Elements((num_threads as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            &num_threads,
            |b, &num_threads| {
                let limiter = Arc::new(
                    CallLimiter::builder()
                        .with_discipline(Discipline::Queue)
                        .with_runtime(rt.handle().clone())
                        .build()
                        .unwrap(),
                );

                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|t| {
                            let limiter = Arc::clone(&limiter);
                            std::thread::spawn(move || {
                                let key = format!("endpoint-{}", t % 2);
                                for i in 0..1000u64 {
                                    let headers = Headers::new().with("Retry-After", i % 5);
                                    black_box(limiter.report_headers(&key, &headers));
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_hint_parsing,
    bench_rejections,
    bench_concurrent_reports
);
criterion_main!(benches);
