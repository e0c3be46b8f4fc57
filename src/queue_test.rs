// ============================================================================
// TaskQueue Tests
// ============================================================================

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use super::TaskQueue;
use crate::error::FlowError;

fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ------------------------------------------------------------------------
// Ordering
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_idle_queue_runs_task_immediately() {
    setup();
    let queue = TaskQueue::new();
    let result = queue.enqueue(|| async { Ok(41 + 1) }, false).await;
    assert_eq!(result.unwrap(), 42);
}

#[tokio::test]
async fn test_sequential_tasks_execute_in_submission_order() {
    setup();
    let queue = TaskQueue::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let order = Arc::clone(&order);
        queue
            .enqueue(
                move || async move {
                    order.lock().unwrap().push(i);
                    Ok(())
                },
                false,
            )
            .await
            .unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_overlapping_submissions_execute_in_order_never_concurrently() {
    setup();
    let queue = TaskQueue::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicBool::new(false));

    let task = |tag: u32| {
        let order = Arc::clone(&order);
        let running = Arc::clone(&running);
        move || async move {
            assert!(!running.swap(true, Ordering::SeqCst), "tasks overlapped");
            tokio::time::sleep(Duration::from_millis(5)).await;
            order.lock().unwrap().push(tag);
            running.store(false, Ordering::SeqCst);
            Ok(())
        }
    };

    // join! polls in argument order, so submission order is 1, 2, 3
    // while task 1 is still sleeping when 2 and 3 are submitted.
    let (a, b, c) = tokio::join!(
        queue.enqueue(task(1), false),
        queue.enqueue(task(2), false),
        queue.enqueue(task(3), false),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

// ------------------------------------------------------------------------
// Bail / poison semantics
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_non_bail_failure_does_not_poison_chain() {
    setup();
    let queue = TaskQueue::new();

    let failed = queue
        .enqueue(
            || async { Err::<(), _>(anyhow::anyhow!("transient miss")) },
            false,
        )
        .await;
    assert!(matches!(failed, Err(FlowError::Task(_))));

    // The next task still executes normally.
    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);
    queue
        .enqueue(
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            false,
        )
        .await
        .unwrap();
    assert!(invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_bail_failure_skips_later_tasks_with_original_error() {
    setup();
    let queue = TaskQueue::new();

    let original = queue
        .enqueue(|| async { Err::<(), _>(anyhow::anyhow!("surface lost")) }, true)
        .await
        .unwrap_err();

    let invoked = Arc::new(AtomicBool::new(false));
    for _ in 0..3 {
        let flag = Arc::clone(&invoked);
        let err = queue
            .enqueue(
                move || async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                true,
            )
            .await
            .unwrap_err();
        assert!(
            err.same_failure(&original),
            "skipped task must surface the original poisoning failure"
        );
    }
    assert!(!invoked.load(Ordering::SeqCst), "poisoned queue ran a task body");
}

#[tokio::test]
async fn test_bail_failure_from_idle_queue_still_poisons() {
    setup();
    let queue = TaskQueue::new();

    // Uncontended queue: the failing task runs immediately from Idle
    // but must still leave a poisoned trace behind.
    let original = queue
        .enqueue(|| async { Err::<(), _>(anyhow::anyhow!("boom")) }, true)
        .await
        .unwrap_err();

    let err = queue.enqueue(|| async { Ok(()) }, true).await.unwrap_err();
    assert!(err.same_failure(&original));
}

#[tokio::test]
async fn test_non_bail_submission_clears_poison() {
    setup();
    let queue = TaskQueue::new();

    let original = queue
        .enqueue(|| async { Err::<(), _>(anyhow::anyhow!("poison")) }, true)
        .await
        .unwrap_err();

    // The non-bailing link is itself skipped and still fails with the
    // original error, but it swallows the poison for its successors.
    let skipped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&skipped);
    let err = queue
        .enqueue(
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            false,
        )
        .await
        .unwrap_err();
    assert!(err.same_failure(&original));
    assert!(!skipped.load(Ordering::SeqCst));

    // Chain is healthy again.
    let value = queue.enqueue(|| async { Ok(7) }, true).await.unwrap();
    assert_eq!(value, 7);
}

// ------------------------------------------------------------------------
// Disposal
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_dispose_fails_new_submissions_without_invoking() {
    setup();
    let queue = TaskQueue::new();
    queue.dispose();
    assert!(queue.is_disposed());

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);
    let err = queue
        .enqueue(
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Disposed));
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dispose_fails_pending_tasks_but_not_running_one() {
    setup();
    let queue = TaskQueue::new();
    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);

    let (running, pending, _) = tokio::join!(
        queue.enqueue(
            || async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok("finished")
            },
            false,
        ),
        queue.enqueue(
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok("never")
            },
            false,
        ),
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            queue.dispose();
        },
    );

    // The already-executing task is not cancelled by disposal.
    assert_eq!(running.unwrap(), "finished");
    // The chained task observes disposal at execution time.
    assert!(matches!(pending.unwrap_err(), FlowError::Disposed));
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
    setup();
    let queue = TaskQueue::new();
    queue.dispose();
    queue.dispose();
    assert!(queue.is_disposed());
}
