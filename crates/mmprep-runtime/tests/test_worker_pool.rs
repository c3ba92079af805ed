// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Concurrency behaviour of the shared worker pool when several callers submit work.

use mmprep_runtime::WorkerPool;

#[cfg(test)]
mod test_shared_pool {
    use super::*;
    use crossbeam::channel;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_concurrent_batches_complete_independently() {
        let pool = Arc::new(WorkerPool::new(2, "shared").unwrap());
        let (release_tx, release_rx) = channel::bounded::<()>(1);
        let slow_done = Arc::new(AtomicBool::new(false));

        // Caller A occupies one worker until released.
        let slow_pool = Arc::clone(&pool);
        let slow_flag = Arc::clone(&slow_done);
        let slow_caller = thread::spawn(move || {
            let mut batch = slow_pool.batch::<()>();
            batch.add_task(move |_| {
                release_rx.recv().ok();
                slow_flag.store(true, Ordering::SeqCst);
                Ok(())
            });
            batch.run_all(false);
            batch.wait_all(true).unwrap();
        });

        // Give caller A time to dispatch.
        thread::sleep(Duration::from_millis(50));

        // Caller B's batch finishes on the remaining worker while A is still blocked.
        let counter = Arc::new(AtomicUsize::new(0));
        let mut batch = pool.batch::<()>();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            batch.add_task(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        batch.run_all(true);
        batch.wait_all(true).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert!(!slow_done.load(Ordering::SeqCst), "B must not wait for A's task");

        release_tx.send(()).unwrap();
        slow_caller.join().unwrap();
        assert!(slow_done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_idle_is_global() {
        let pool = Arc::new(WorkerPool::new(2, "global").unwrap());
        let (release_tx, release_rx) = channel::bounded::<()>(1);

        let mut batch = pool.batch::<()>();
        batch.add_task(move |_| {
            release_rx.recv().ok();
            Ok(())
        });
        batch.run_all(false);

        // A different caller waiting on the global barrier observes A's outstanding task.
        let returned = Arc::new(AtomicBool::new(false));
        let waiter_pool = Arc::clone(&pool);
        let waiter_flag = Arc::clone(&returned);
        let waiter = thread::spawn(move || {
            waiter_pool.wait_idle();
            waiter_flag.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!returned.load(Ordering::SeqCst));
        assert_eq!(pool.pending(), 1);

        release_tx.send(()).unwrap();
        waiter.join().unwrap();
        assert!(returned.load(Ordering::SeqCst));
        batch.wait_all(true).unwrap();
    }

    #[test]
    fn test_drop_drains_queued_work() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(1, "drain").unwrap();
            let mut batch = pool.batch::<()>();
            for _ in 0..16 {
                let counter = Arc::clone(&counter);
                batch.add_task(move |_| {
                    thread::sleep(Duration::from_millis(1));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            batch.run_all(false);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
