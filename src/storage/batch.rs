//! 批量删除协调器 / Batch delete coordinator
//!
//! 后端没有原生批量删除时使用：固定 4 个 worker 共享一个游标，
//! 锁内取下标、锁外删除，失败键在独立的锁下累积。
//! 有界并行，既不给后端打满，也不退化成串行逐个删。

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{DriverError, Result};

/// Worker 数量 / Fixed worker pool size
pub const DELETE_WORKERS: usize = 4;

/// 并行删除一批对象键 / Delete a batch of keys in parallel
///
/// 每个键恰好尝试一次；全部 worker 结束后才返回。
/// 返回 (失败键, 最后一个错误)：失败键各出现一次、顺序不保证，
/// 之前的错误被后来者覆盖，只留最后一个。
pub async fn delete_batch<F>(keys: Vec<String>, delete: F) -> (Vec<String>, Option<DriverError>)
where
    F: Fn(String) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
{
    let total = keys.len();
    let keys = Arc::new(keys);
    let delete = Arc::new(delete);
    let cursor = Arc::new(Mutex::new(0usize));
    let failures: Arc<Mutex<(Vec<String>, Option<DriverError>)>> =
        Arc::new(Mutex::new((Vec::new(), None)));

    let mut workers = Vec::with_capacity(DELETE_WORKERS);
    for _ in 0..DELETE_WORKERS {
        let keys = keys.clone();
        let delete = delete.clone();
        let cursor = cursor.clone();
        let failures = failures.clone();

        workers.push(tokio::spawn(async move {
            loop {
                // 游标临界区只做取下标，删除在锁外进行
                let index = {
                    let mut cur = cursor.lock();
                    if *cur >= keys.len() {
                        return;
                    }
                    let index = *cur;
                    *cur += 1;
                    index
                };

                let key = keys[index].clone();
                if let Err(err) = delete(key.clone()).await {
                    tracing::warn!("对象删除失败: {} - {}", key, err);
                    let mut failed = failures.lock();
                    failed.0.push(key);
                    failed.1 = Some(err);
                }
            }
        }));
    }

    for worker in workers {
        // worker 内部不 panic，join 失败只可能是运行时关闭
        let _ = worker.await;
    }

    let mut guard = failures.lock();
    let failed = std::mem::take(&mut guard.0);
    let last_err = guard.1.take();

    if !failed.is_empty() {
        tracing::warn!("批量删除部分失败: {}/{}", failed.len(), total);
    }
    (failed, last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures::FutureExt;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_failed_keys_and_exactly_once() {
        // 17 个键，以 x 结尾的删除失败
        let keys: Vec<String> = (1..=17)
            .map(|i| {
                if i % 5 == 0 {
                    format!("obj{}x", i)
                } else {
                    format!("obj{}", i)
                }
            })
            .collect();
        let expected_failed: HashSet<String> =
            keys.iter().filter(|k| k.ends_with('x')).cloned().collect();

        let attempted = Arc::new(Mutex::new(Vec::<String>::new()));
        let attempted_in = attempted.clone();

        let (failed, last_err) = delete_batch(keys.clone(), move |key: String| {
            let attempted = attempted_in.clone();
            async move {
                attempted.lock().push(key.clone());
                tokio::time::sleep(Duration::from_millis(2)).await;
                if key.ends_with('x') {
                    Err(DriverError::Backend(anyhow!("删除失败: {}", key)))
                } else {
                    Ok(())
                }
            }
            .boxed()
        })
        .await;

        // 每个键恰好尝试一次
        let attempted = attempted.lock();
        assert_eq!(attempted.len(), 17);
        assert_eq!(attempted.iter().collect::<HashSet<_>>().len(), 17);

        let failed_set: HashSet<String> = failed.iter().cloned().collect();
        assert_eq!(failed_set, expected_failed);
        assert_eq!(failed.len(), expected_failed.len());
        assert!(matches!(last_err, Some(DriverError::Backend(_))));
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_worker_pool() {
        let keys: Vec<String> = (0..17).map(|i| format!("key{}", i)).collect();

        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let in_flight_in = in_flight.clone();
        let max_seen_in = max_seen.clone();

        let (failed, last_err) = delete_batch(keys, move |_key: String| {
            let in_flight = in_flight_in.clone();
            let max_seen = max_seen_in.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
        .await;

        assert!(failed.is_empty());
        assert!(last_err.is_none());
        let max = max_seen.load(Ordering::SeqCst);
        assert!(max <= DELETE_WORKERS, "并发 {} 超出 worker 上限", max);
        assert!(max >= 2, "未观察到并行删除");
    }

    #[tokio::test]
    async fn test_fewer_keys_than_workers() {
        let (failed, last_err) = delete_batch(
            vec!["only".to_string()],
            move |_key: String| async move { Ok(()) }.boxed(),
        )
        .await;
        assert!(failed.is_empty());
        assert!(last_err.is_none());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (failed, last_err) =
            delete_batch(Vec::new(), move |_key: String| async move { Ok(()) }.boxed()).await;
        assert!(failed.is_empty());
        assert!(last_err.is_none());
    }
}
