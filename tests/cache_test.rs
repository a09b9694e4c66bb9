//! Concurrency tests for TypedCache

use rust_cache_pool::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_disjoint_writers_last_write_wins() {
    init_logger();
    let cache: Arc<TypedCache<String, usize>> = Arc::new(TypedCache::new());
    let threads = 8;
    let writes_per_key = 50;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let key = format!("key-{}", t);
                for i in 0..writes_per_key {
                    cache.put(key.clone(), t * 1000 + i);
                    // Readers never see a value from another thread's key
                    let seen = cache.get(&key).expect("own key must be present");
                    assert_eq!(seen / 1000, t);
                    if i % 10 == 9 {
                        cache.delete(&key);
                        cache.put(key.clone(), t * 1000 + i);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("writer panicked");
    }

    assert_eq!(cache.len(), threads);
    for t in 0..threads {
        assert_eq!(
            cache.get(&format!("key-{}", t)),
            Some(t * 1000 + writes_per_key - 1)
        );
    }
}

#[test]
fn test_hundred_callers_compute_once() {
    init_logger();
    let cache: Arc<TypedCache<&'static str, String>> = Arc::new(TypedCache::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(100));

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_compute("x", || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    thread::sleep(Duration::from_millis(30));
                    Ok::<_, String>(format!("computed-{}", n))
                })
            })
        })
        .collect();

    let values: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().expect("caller panicked").expect("compute failed"))
        .collect();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(values.len(), 100);
    assert!(values.iter().all(|v| v == "computed-1"));

    let stats = cache.stats();
    assert_eq!(stats.computations, 1);
    assert_eq!(stats.hits + stats.coalesced, 99);
}

#[test]
fn test_failed_compute_is_retried() {
    init_logger();
    let cache: TypedCache<&str, u32> = TypedCache::new();
    let calls = AtomicUsize::new(0);

    let first = cache.get_or_compute("flaky", || {
        calls.fetch_add(1, Ordering::SeqCst);
        Err("transient failure")
    });
    assert_eq!(
        first,
        Err(PipelineError::compute_failed("transient failure"))
    );
    assert_eq!(cache.get(&"flaky"), None);

    let second = cache.get_or_compute("flaky", || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(11)
    });
    assert_eq!(second, Ok(11));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_waiters_share_compute_failure() {
    init_logger();
    let cache: Arc<TypedCache<u8, u8>> = Arc::new(TypedCache::new());
    let barrier = Arc::new(Barrier::new(10));
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_compute(1, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    Err("upstream unavailable")
                })
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Callers that arrived while the claim was held saw the same failure; a
    // straggler arriving after release may have retried and failed on its own.
    assert!(outcomes
        .iter()
        .all(|o| *o == Err(PipelineError::compute_failed("upstream unavailable"))));
    assert!(calls.load(Ordering::SeqCst) < 10);
    assert!(cache.is_empty());
}

#[test]
fn test_panicking_compute_wakes_waiters() {
    init_logger();
    let cache: Arc<TypedCache<u8, u8>> = Arc::new(TypedCache::new());

    let panicker = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache.get_or_compute(7, || -> std::result::Result<u8, String> {
                thread::sleep(Duration::from_millis(100));
                panic!("compute blew up");
            })
        })
    };

    thread::sleep(Duration::from_millis(30));
    let waiter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get_or_compute(7, || Ok::<_, String>(1)))
    };

    assert!(panicker.join().is_err());
    let waited = waiter.join().unwrap();
    assert!(
        waited == Err(PipelineError::compute_failed("computation panicked")) || waited == Ok(1),
        "unexpected outcome: {:?}",
        waited
    );

    // The key is not poisoned
    assert_eq!(cache.get_or_compute(7, || Ok::<_, String>(2)).map(|_| ()), Ok(()));
}

#[test]
fn test_slow_compute_does_not_block_other_keys() {
    init_logger();
    let cache: Arc<TypedCache<&'static str, u32>> = Arc::new(TypedCache::new());
    let started = Arc::new(Barrier::new(2));

    let slow = {
        let cache = Arc::clone(&cache);
        let started = Arc::clone(&started);
        thread::spawn(move || {
            cache.get_or_compute("slow", || {
                started.wait();
                thread::sleep(Duration::from_millis(200));
                Ok::<_, String>(1)
            })
        })
    };

    started.wait();
    let begin = std::time::Instant::now();
    cache.put("fast", 2);
    assert_eq!(cache.get(&"fast"), Some(2));
    assert_eq!(cache.get_or_compute("other", || Ok::<_, String>(3)), Ok(3));
    assert!(begin.elapsed() < Duration::from_millis(150));

    assert_eq!(slow.join().unwrap(), Ok(1));
    assert_eq!(cache.len(), 3);
}
