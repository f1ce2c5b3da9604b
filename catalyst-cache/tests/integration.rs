//! Integration tests: caches driven by the tokio timer.

#![cfg(feature = "tokio")]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use catalyst_cache::{
    CachePolicy, Emitter, Listener, RetentionCache, SubscriptionCache, Teardown, TokioScheduler,
};
use tokio::task::LocalSet;
use tokio::time::{sleep, Instant};

const POLICY: &str = "retention_ms = 1000";

#[tokio::test(start_paused = true)]
async fn retention_cache_disposes_on_the_tokio_timer() {
    LocalSet::new()
        .run_until(async {
            let disposed_at = Rc::new(Cell::new(None));
            let sink = disposed_at.clone();
            let start = Instant::now();
            let cache = RetentionCache::new(
                CachePolicy::from_toml_str(POLICY).unwrap(),
                Rc::new(TokioScheduler),
                |id: &u32| id.to_string(),
                |id: &u32| *id,
                move |_: u32| sink.set(Some(start.elapsed())),
            );

            cache.acquire(&1).release();
            sleep(Duration::from_millis(400)).await;

            // Reacquiring restarts the countdown from the next release.
            let lease = cache.acquire(&1);
            sleep(Duration::from_millis(2000)).await;
            assert_eq!(disposed_at.get(), None);

            lease.release();
            sleep(Duration::from_millis(1500)).await;

            let disposed_at = disposed_at.get().expect("entry was not disposed");
            assert!(disposed_at >= Duration::from_millis(3400));
            assert!(disposed_at < Duration::from_millis(3500));
            assert_eq!(cache.size(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn subscription_cache_shares_an_interval_feed() {
    LocalSet::new()
        .run_until(async {
            let stopped = Rc::new(Cell::new(0));
            let stop_count = stopped.clone();

            // Each upstream ticks every 100ms until torn down.
            let cache: SubscriptionCache<u64, u64> = SubscriptionCache::new(
                CachePolicy::from_toml_str(POLICY).unwrap(),
                Rc::new(TokioScheduler),
                |step: &u64| step.to_string(),
                move |step: &u64, emitter: Emitter<u64>| -> Teardown {
                    let step = *step;
                    let ticker = tokio::task::spawn_local(async move {
                        let mut value = 0;
                        loop {
                            sleep(Duration::from_millis(100)).await;
                            value += step;
                            emitter.emit(value);
                        }
                    });
                    let stop_count = stop_count.clone();
                    Box::new(move || {
                        ticker.abort();
                        stop_count.set(stop_count.get() + 1);
                    })
                },
            );

            let seen = Rc::new(RefCell::new(Vec::new()));
            let sink = seen.clone();
            let listener: Listener<u64> = Rc::new(move |v: &u64| sink.borrow_mut().push(*v));

            let first = cache.subscribe(&5, listener);
            sleep(Duration::from_millis(350)).await;
            assert_eq!(*seen.borrow(), vec![5, 10, 15]);

            let late = Rc::new(RefCell::new(Vec::new()));
            let late_sink = late.clone();
            let second = cache.subscribe(
                &5,
                Rc::new(move |v: &u64| late_sink.borrow_mut().push(*v)),
            );
            assert_eq!(*late.borrow(), vec![15]);

            first.unsubscribe();
            second.unsubscribe();
            assert_eq!(cache.size(), 1);

            sleep(Duration::from_millis(1100)).await;
            assert_eq!(stopped.get(), 1);
            assert_eq!(cache.size(), 0);
            assert_eq!(*seen.borrow(), vec![5, 10, 15]);
        })
        .await;
}
