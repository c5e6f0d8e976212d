use std::time::{Duration, Instant};

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use pendulum_core::{DelayWindow, Package, TriggerCorrelator};

// Trigger timestamps spaced `gap_ms` apart, newest last, ending at `now`.
fn trigger_trace(now: Instant, n: usize, gap_ms: u64) -> Vec<Instant> {
    (0..n)
        .rev()
        .filter_map(|i| now.checked_sub(Duration::from_millis(gap_ms * i as u64)))
        .collect()
}

pub fn bench_correlate(c: &mut Criterion) {
    let mut g = c.benchmark_group("correlate");
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 cargo bench -p pendulum_core --bench correlator
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(50);
    }

    let now = Instant::now() + Duration::from_secs(5);
    for &queued in &[1usize, 8, 32] {
        let trace = trigger_trace(now, queued, 40);
        g.bench_function(format!("matched_q{queued}"), |b| {
            b.iter_batched(
                || {
                    let corr = TriggerCorrelator::new(DelayWindow::new(100, 1500), 100);
                    for &t in &trace {
                        corr.on_trigger(t);
                    }
                    (corr, Package::new(1, "bench", 1, now))
                },
                |(corr, mut p)| {
                    let _ = black_box(corr.correlate(&mut p, now + Duration::from_millis(120)));
                },
                BatchSize::SmallInput,
            )
        });
    }

    g.bench_function("estimated_full_history", |b| {
        let corr = TriggerCorrelator::new(DelayWindow::new(100, 1500), 100);
        for d in 0..100u64 {
            corr.record_delay(200 + (d * 37) % 400);
        }
        b.iter(|| {
            let mut p = Package::new(1, "bench", 2, now);
            let _ = black_box(corr.correlate(&mut p, now));
        })
    });
    g.finish();
}

criterion_group!(benches, bench_correlate);
criterion_main!(benches);
