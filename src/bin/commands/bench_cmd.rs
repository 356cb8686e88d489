use anyhow::{Context, Result};
use qqwry::Database;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::cli_utils::{format_bytes, format_number, format_qps};

pub fn cmd_bench(
    database: PathBuf,
    query_count: usize,
    load_iterations: usize,
    cache_size: Option<usize>,
    cache_hit_rate: usize,
) -> Result<()> {
    let query_count = query_count.max(1);
    let load_iterations = load_iterations.max(1);

    println!("=== QQWry Lookup Benchmark ===\n");
    println!("Configuration:");
    println!("  Database:          {}", database.display());
    println!("  Load iterations:   {}", load_iterations);
    println!("  Query iterations:  {}", format_number(query_count));
    println!(
        "  Cache:             {}",
        match cache_size {
            None => "slot per entry".to_string(),
            Some(0) => "disabled".to_string(),
            Some(n) => format!("LRU, {}", format_number(n)),
        }
    );
    println!(
        "  Cache hit rate:    {}% (query repetition{})",
        cache_hit_rate,
        if cache_hit_rate == 0 {
            " - worst case"
        } else {
            ""
        }
    );
    println!();

    println!("--- Phase 1: Load Database (mmap + index build) ---");
    let mut load_times = Vec::with_capacity(load_iterations);
    for i in 1..=load_iterations {
        let load_start = Instant::now();
        let _db = Database::open(&database)
            .with_context(|| format!("Failed to load database: {}", database.display()))?;
        let load_time = load_start.elapsed();
        load_times.push(load_time);
        println!(
            "  Load #{}: {:.3}ms",
            i,
            load_time.as_micros() as f64 / 1000.0
        );
    }
    let avg_load = mean_duration(load_times.iter().sum(), load_iterations);
    println!("  Average:  {:.3}ms", avg_load.as_micros() as f64 / 1000.0);
    println!();

    println!("--- Phase 2: Query Performance ---");
    let opener = Database::from(&database);
    let db = match cache_size {
        None => opener.slot_cache(),
        Some(n) => opener.cache_capacity(n),
    }
    .open()
    .with_context(|| format!("Failed to load database: {}", database.display()))?;

    println!("  DB size:     {}", format_bytes(db.len()));
    println!("  Entries:     {}", format_number(db.entry_count()));

    // Distinct addresses needed to reach the target repetition rate
    let unique_queries = if cache_hit_rate >= 100 {
        1
    } else {
        ((query_count as u128 * (100 - cache_hit_rate) as u128 / 100) as usize).max(1)
    };

    let bench_start = Instant::now();
    let mut found = 0usize;
    for i in 0..query_count {
        // Spread the distinct addresses over the whole IPv4 space
        let slot = (i % unique_queries) as u32;
        let ip = Ipv4Addr::from(slot.wrapping_mul(0x9E37_79B9));
        if db.lookup_ip(ip)?.is_some() {
            found += 1;
        }
    }
    let bench_time = bench_start.elapsed();
    let qps = query_count as f64 / bench_time.as_secs_f64();
    let avg_query = mean_duration(bench_time, query_count);

    println!("  Query count: {}", format_number(query_count));
    println!("  Total time:  {:.2}s", bench_time.as_secs_f64());
    println!("  QPS:         {} queries/sec", format_qps(qps));
    println!(
        "  Avg latency: {:.2}µs",
        avg_query.as_nanos() as f64 / 1000.0
    );
    println!(
        "  Found:       {}/{}",
        format_number(found),
        format_number(query_count)
    );

    let stats = db.cache_stats();
    if stats.hits + stats.misses > 0 {
        println!(
            "  Cache:       {} hits, {} misses ({:.1}% hit rate)",
            format_number(stats.hits as usize),
            format_number(stats.misses as usize),
            stats.hit_rate() * 100.0
        );
    }
    println!();
    println!("✓ Benchmark complete");

    Ok(())
}

/// Average of `count` samples totalling `total`, without narrowing `count`
fn mean_duration(total: Duration, count: usize) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    total.div_f64(count as f64)
}
