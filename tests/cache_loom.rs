#![cfg(feature = "check-loom")]

use genericache::Cache;
use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

#[test]
fn single_flight() {
    loom::model(|| {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = {
            let calls = calls.clone();
            Arc::new(Cache::new(
                move |i: &usize| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(i + 5)
                },
                false,
            ))
        };

        let handles = (0..2)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get(1))
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(6));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn retried_fills_never_overlap() {
    loom::model(|| {
        let calls = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let cache = {
            let calls = calls.clone();
            let in_flight = in_flight.clone();
            Arc::new(Cache::new(
                move |_: &u8| {
                    assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    if n == 0 {
                        Err("first")
                    } else {
                        Ok(n)
                    }
                },
                true,
            ))
        };

        let other = {
            let cache = cache.clone();
            thread::spawn(move || cache.get(0))
        };
        let mine = cache.get(0);
        let theirs = other.join().unwrap();

        // Exactly one of the two lookups ran the failing first fill.
        assert!(mine.is_err() ^ theirs.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get(0), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn distinct_keys_fill_independently() {
    loom::model(|| {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = {
            let calls = calls.clone();
            Arc::new(Cache::new(
                move |i: &usize| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(*i)
                },
                false,
            ))
        };

        let other = {
            let cache = cache.clone();
            thread::spawn(move || cache.get(1))
        };
        assert_eq!(cache.get(2), Ok(2));
        assert_eq!(other.join().unwrap(), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    });
}
