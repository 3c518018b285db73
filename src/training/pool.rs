use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

/// 有並行上限的運行池
///
/// 每個任務獨立運行，空出名額後才啟動下一個排隊的任務。
#[derive(Debug, Clone)]
pub struct RunPool {
    max_concurrency: usize,
}

impl RunPool {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// 執行全部任務，返回 `(任務編號, 結果)`，順序與輸入一致
    pub async fn run_all<T, F, Fut, R>(&self, items: Vec<T>, job: F) -> Vec<(usize, R)>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        info!(total, max_concurrency = self.max_concurrency, "開始執行運行池");

        for (position, item) in items.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let future = job(item);
            tasks.spawn(async move {
                // 信號量不會被關閉
                let _permit = semaphore.acquire_owned().await.ok();
                (position, future.await)
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(output) => results.push(output),
                Err(e) => error!("運行任務異常結束: {}", e),
            }
        }
        results.sort_by_key(|(position, _)| *position);

        info!(completed = results.len(), total, "運行池執行完成");
        results
    }
}
