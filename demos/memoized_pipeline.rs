//! Memoized streaming pipeline example
//!
//! Workers share a `TypedCache` so repeated inputs are computed once, results
//! stream to a consumer thread, and a deadline cancels the second run.
//!
//! Run with: cargo run --example memoized_pipeline

use rust_cache_pool::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn slow_fib(n: u64) -> u64 {
    thread::sleep(Duration::from_millis(20));
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    a
}

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Rust Cache Pool - Memoized Pipeline Example ===\n");

    let cache: Arc<TypedCache<u64, u64>> = Arc::new(TypedCache::new());

    println!("1. Draining run with a shared cache:");
    let memo = Arc::clone(&cache);
    let config = PoolConfig::new(4)
        .with_input_capacity(8)
        .with_thread_name_prefix("fib");
    let pool = WorkerPool::with_config(config, move |n: u64| {
        if n > 90 {
            return Err(format!("fib({}) overflows u64", n));
        }
        memo.get_or_compute(n, || Ok::<_, String>(slow_fib(n)))
            .map_err(|e| e.to_string())
    })?;
    let results = pool.results();
    pool.start()?;

    let consumer = thread::spawn(move || {
        let mut ok = 0;
        for result in results.iter() {
            match result.outcome() {
                Ok(value) => {
                    ok += 1;
                    log::debug!("job {} -> {}", result.job_id(), value);
                }
                Err(e) => println!("   job {} failed: {}", result.job_id(), e),
            }
        }
        ok
    });

    for n in (0..40).map(|i| i % 10).chain([95]) {
        pool.submit(n)?;
    }
    pool.shutdown()?;

    let delivered = consumer.join().unwrap_or(0);
    let cache_stats = cache.stats();
    println!("   Results delivered: {}", delivered);
    println!(
        "   Cache: {} computations, {} hits, {} coalesced, hit ratio {:.2}",
        cache_stats.computations,
        cache_stats.hits,
        cache_stats.coalesced,
        cache_stats.hit_ratio()
    );

    println!("\n2. Per-worker statistics:");
    for (i, stat) in pool.worker_stats().iter().enumerate() {
        println!(
            "   Worker {}: {} processed, {} failed, avg time: {:.2}μs",
            i,
            stat.get_jobs_processed(),
            stat.get_jobs_failed(),
            stat.get_average_processing_time_us()
        );
    }

    println!("\n3. Cancelled run with a 50ms deadline:");
    cache.clear();
    let memo = Arc::clone(&cache);
    let pool = WorkerPool::with_config(PoolConfig::new(2).with_input_capacity(4), move |n: u64| {
        memo.get_or_compute(n, || Ok::<_, String>(slow_fib(n)))
    })?;
    let results = pool.results();
    pool.start()?;
    pool.cancel_after(Duration::from_millis(50));

    let mut accepted = 0;
    for n in 0..1000 {
        if pool.submit(n).is_err() {
            break;
        }
        accepted += 1;
    }
    pool.wait()?;

    let stats = pool.stats();
    println!("   Accepted before deadline: {}", accepted);
    println!("   Results delivered: {}", results.iter().count());
    println!("   Abandoned by workers: {}", stats.jobs_abandoned);
    println!("   Final state: {}", stats.state);

    println!("\n=== Example completed successfully ===");
    Ok(())
}
