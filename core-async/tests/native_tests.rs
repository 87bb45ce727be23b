//! Integration tests for the runtime facade.

use core_async::sync::{self, CancellationToken};
use core_async::task::{self, TaskGroup};
use core_async::time;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    let result = handle.await.unwrap();
    assert_eq!(result, 42);
}

#[tokio::test]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(200)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_task_group_joins_every_task() {
    let group = TaskGroup::new();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let counter = counter.clone();
        group.spawn(move |_token| async move {
            time::sleep(time::Duration::from_millis(5)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    let failed = group.join_all().await;
    assert_eq!(failed, 0);
    assert_eq!(counter.load(Ordering::SeqCst), 8);
    assert_eq!(group.pending(), 0);
}

#[tokio::test]
async fn test_task_group_cancelled_with_parent() {
    let parent = CancellationToken::new();
    let group = TaskGroup::with_parent(&parent);
    let observed = Arc::new(AtomicUsize::new(0));

    let seen = observed.clone();
    group.spawn(move |token| async move {
        token.cancelled().await;
        seen.fetch_add(1, Ordering::SeqCst);
    });

    parent.cancel();
    group.join_all().await;

    assert!(group.is_cancelled());
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_task_group_shutdown_does_not_cancel_parent() {
    let parent = CancellationToken::new();
    let group = TaskGroup::with_parent(&parent);

    group.spawn(|token| async move {
        token.cancelled().await;
    });

    group.shutdown().await;
    assert!(group.is_cancelled());
    assert!(!parent.is_cancelled());
}

#[tokio::test]
async fn test_task_group_counts_panics() {
    let group = TaskGroup::new();
    group.spawn(|_token| async move {
        panic!("background task failure");
    });
    group.spawn(|_token| async move {});

    assert_eq!(group.join_all().await, 1);
}

#[tokio::test]
async fn test_semaphore_bounds_concurrency() {
    let semaphore = Arc::new(sync::Semaphore::new(2));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for _ in 0..6 {
        let semaphore = semaphore.clone();
        let active = active.clone();
        let peak = peak.clone();
        handles.push(task::spawn(async move {
            let _permit = semaphore.acquire_owned().await.unwrap();
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            time::sleep(time::Duration::from_millis(10)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_watch_channel() {
    let (tx, mut rx) = sync::watch::channel(0usize);

    task::spawn(async move {
        for i in 1..=3 {
            time::sleep(time::Duration::from_millis(5)).await;
            tx.send(i).unwrap();
        }
    });

    let mut last_value = 0;
    while rx.changed().await.is_ok() {
        last_value = *rx.borrow();
        if last_value >= 3 {
            break;
        }
    }

    assert_eq!(last_value, 3);
}
