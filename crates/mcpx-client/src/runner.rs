use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinSet;

/// Bounded worker pool with order-preserving results.
///
/// Up to `min(concurrency, items.len())` workers each pull the next
/// un-started index from a shared monotonic counter until the input is
/// exhausted. The output has the same length and order as the input
/// regardless of completion order. The processor is infallible by
/// contract: per-item failures must be encoded in the result value, so
/// one slow or failing item never poisons the batch.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, concurrency: usize, processor: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T, usize) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let workers = concurrency.max(1).min(total);
    let pending: Arc<Mutex<Vec<Option<T>>>> =
        Arc::new(Mutex::new(items.into_iter().map(Some).collect()));
    let results: Arc<Mutex<Vec<Option<R>>>> =
        Arc::new(Mutex::new((0..total).map(|_| None).collect()));
    let next_index = Arc::new(AtomicUsize::new(0));

    let mut set = JoinSet::new();
    for _ in 0..workers {
        let pending = pending.clone();
        let results = results.clone();
        let next_index = next_index.clone();
        let processor = processor.clone();
        set.spawn(async move {
            loop {
                let index = next_index.fetch_add(1, Ordering::Relaxed);
                if index >= total {
                    break;
                }
                let Some(item) = pending
                    .lock()
                    .ok()
                    .and_then(|mut slots| slots[index].take())
                else {
                    continue;
                };
                let result = processor(item, index).await;
                if let Ok(mut slots) = results.lock() {
                    slots[index] = Some(result);
                }
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(error) = joined {
            if error.is_panic() {
                std::panic::resume_unwind(error.into_panic());
            }
            tracing::debug!(error = %error, "runner worker did not complete");
        }
    }

    let mut slots = match results.lock() {
        Ok(mut slots) => std::mem::take(&mut *slots),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    let collected: Vec<R> = slots.drain(..).flatten().collect();
    debug_assert_eq!(collected.len(), total);
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct ItemResult {
        index: usize,
        error: Option<String>,
    }

    #[tokio::test]
    async fn empty_input_returns_empty_output() {
        let results: Vec<u32> =
            run_bounded(Vec::<u32>::new(), 5, |item, _| async move { item }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn results_preserve_input_order() {
        // Earlier items sleep longer, so completion order is reversed.
        let items: Vec<u64> = (0..8).collect();
        let results = run_bounded(items, 8, |item, index| async move {
            tokio::time::sleep(Duration::from_millis(80 - item * 10)).await;
            (index, item * 2)
        })
        .await;

        assert_eq!(results.len(), 8);
        for (position, (index, doubled)) in results.iter().enumerate() {
            assert_eq!(*index, position);
            assert_eq!(*doubled, position as u64 * 2);
        }
    }

    #[tokio::test]
    async fn per_item_failure_does_not_poison_batch() {
        let items = vec!["a", "b", "fail", "d", "e"];
        let results = run_bounded(items, 2, |item, index| async move {
            if item == "fail" {
                ItemResult {
                    index,
                    error: Some("boom".into()),
                }
            } else {
                ItemResult { index, error: None }
            }
        })
        .await;

        assert_eq!(results.len(), 5);
        assert_eq!(results[2].error.as_deref(), Some("boom"));
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
            if i != 2 {
                assert!(result.error.is_none());
            }
        }
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let flight = in_flight.clone();
        let peak_seen = peak.clone();
        let items: Vec<u32> = (0..20).collect();
        run_bounded(items, 3, move |_, _| {
            let flight = flight.clone();
            let peak_seen = peak_seen.clone();
            async move {
                let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn concurrency_of_one_still_completes() {
        let items: Vec<u32> = (0..4).collect();
        let results = run_bounded(items, 1, |item, _| async move { item + 1 }).await;
        assert_eq!(results, vec![1, 2, 3, 4]);
    }
}
