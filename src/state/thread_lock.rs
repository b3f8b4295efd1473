//! 线程级互斥：同一 thread_id 同时只处理一个请求
//!
//! 检查点的 save/load 不是合并操作，同线程并发修改会让后写者静默覆盖历史，
//! 因此第二个请求排队等待第一个完成（排队而非拒绝）。锁表按 thread_id 惰性创建，
//! 跨网络调用持有的只有这把请求级异步锁本身。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// 按 thread_id 维护的请求串行化锁表
#[derive(Default)]
pub struct ThreadLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指定线程的请求锁；guard 存活期间该线程的其他请求排队
    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inner = self.inner.lock().await;
            inner
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_thread_serializes() {
        let locks = Arc::new(ThreadLocks::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("t1").await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_threads_interleave() {
        let locks = Arc::new(ThreadLocks::new());
        let _a = locks.acquire("a").await;
        // 持有 a 锁时 b 锁立即可得
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("b")).await;
        assert!(b.is_ok());
    }
}
