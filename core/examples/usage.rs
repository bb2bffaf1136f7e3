use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use rolling_metrics::{
    HistogramConfig, HitRatio, HitRatioConfig, ResetPolicy, RollingHistogram, Top, TopConfig,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Rolling Metrics Example ===\n");

    println!("--- Response Time Histogram ---");
    simulate_response_times()?;

    println!("--- Slowest Queries ---");
    simulate_slow_queries()?;

    println!("--- Cache Hit Ratio ---");
    simulate_cache_lookups()?;

    Ok(())
}

fn simulate_response_times() -> Result<()> {
    let histogram = Arc::new(
        RollingHistogram::new(&HistogramConfig {
            reset: ResetPolicy::ByChunks {
                window: Duration::from_secs(60),
                chunks: 6,
                include_current_chunk: true,
            },
            percentiles: Some(vec![0.5, 0.9, 0.99]),
            ..Default::default()
        })?,
    );

    let handles: Vec<_> = (0..4u64)
        .map(|worker| {
            let histogram = Arc::clone(&histogram);
            thread::spawn(move || {
                for request in 0..1_000u64 {
                    // Mostly fast responses with a slow tail
                    let micros = if request % 100 == 0 {
                        25_000
                    } else {
                        200 + (request * 7 + worker) % 800
                    };
                    histogram.update(micros);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = histogram.snapshot();
    println!("  Count: {}", snapshot.count());
    println!(
        "  Min: {}us, Max: {}us, Mean: {:.1}us",
        snapshot.min(),
        snapshot.max(),
        snapshot.mean()
    );
    for percentile in snapshot.percentiles() {
        println!("  p{}: {}us", percentile.quantile * 100.0, percentile.value);
    }
    println!();

    Ok(())
}

fn simulate_slow_queries() -> Result<()> {
    let top = Top::new(&TopConfig {
        size: 3,
        slow_threshold: Duration::from_millis(10),
        max_description_length: 40,
        ..Default::default()
    })?;

    let queries = [
        (5, "SELECT id FROM users WHERE email = ?"),
        (
            120,
            "SELECT * FROM orders JOIN order_items USING (order_id) WHERE created_at > ?",
        ),
        (45, "UPDATE accounts SET balance = balance - ? WHERE id = ?"),
        (300, "DELETE FROM sessions WHERE expires_at < now()"),
        (15, "INSERT INTO audit_log VALUES (?, ?, ?)"),
    ];

    for (millis, sql) in queries {
        let ranked = top.update(Duration::from_millis(millis), || sql.to_string());
        println!("  {millis:>4}ms ranked={ranked}");
    }

    for (rank, position) in top.descending_rating().iter().enumerate() {
        println!(
            "  #{} {:?} {}",
            rank + 1,
            position.latency(),
            position.description()
        );
    }
    println!();

    Ok(())
}

fn simulate_cache_lookups() -> Result<()> {
    let ratio = HitRatio::new(&HitRatioConfig {
        reset: ResetPolicy::SmoothlyDecaying {
            window: Duration::from_secs(60),
            chunks: 6,
        },
        ..Default::default()
    })?;

    for batch in 0..10u32 {
        ratio.update(batch % 4, 4);
    }

    println!("  Hit ratio: {:.3}", ratio.hit_ratio());

    Ok(())
}
