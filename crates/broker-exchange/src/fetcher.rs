//! 캐시를 거치는 upstream 호출.
//!
//! 같은 사용자의 대시보드 새로고침이 TTL 안에서 여러 번 들어와도
//! upstream 왕복은 한 번만 일어나도록 합니다.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::clock::Clock;
use crate::error::ExchangeResult;

/// 캐시 + 진행 중 요청 합치기.
pub struct CachedFetcher {
    cache: Arc<dyn ResponseCache>,
    clock: Arc<dyn Clock>,
    dedupe_in_flight: bool,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CachedFetcher {
    pub fn new(cache: Arc<dyn ResponseCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            clock,
            dedupe_in_flight: true,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// 진행 중 요청 합치기 활성화 여부.
    ///
    /// 비활성화하면 동시에 들어온 요청이 각자 upstream을 호출할 수 있고,
    /// 마지막으로 끝난 쓰기가 캐시에 남습니다.
    pub fn with_dedupe(mut self, enabled: bool) -> Self {
        self.dedupe_in_flight = enabled;
        self
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }

    /// 캐시된 값이 유효하면 반환하고, 아니면 `producer`를 호출해 저장 후 반환합니다.
    ///
    /// `producer`가 실패하면 캐시는 변경되지 않습니다.
    pub async fn fetch_with_cache<T, F, Fut>(
        &self,
        user_id: &str,
        producer: F,
    ) -> ExchangeResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        if let Some(payload) = self.lookup(user_id).await {
            return Ok(payload);
        }

        if !self.dedupe_in_flight {
            return self.produce_and_store(user_id, producer).await;
        }

        let lock = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = lock.lock().await;

            // 앞선 요청이 방금 채웠을 수 있음
            match self.lookup(user_id).await {
                Some(payload) => Ok(payload),
                None => self.produce_and_store(user_id, producer).await,
            }
        };

        let mut in_flight = self.in_flight.lock().await;
        if let Some(current) = in_flight.get(user_id) {
            // 맵과 이 호출만 참조 중이면 기다리는 요청이 없음
            if Arc::ptr_eq(current, &lock) && Arc::strong_count(&lock) == 2 {
                in_flight.remove(user_id);
            }
        }

        result
    }

    /// 사용자 캐시 항목 무효화 (주문 등 상태 변경 후).
    pub async fn invalidate(&self, user_id: &str) -> ExchangeResult<()> {
        self.cache.remove(user_id).await
    }

    /// 만료 항목을 주기적으로 정리하는 백그라운드 작업 시작.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        spawn_sweeper(self.cache.clone(), self.clock.clone(), interval, shutdown)
    }

    async fn lookup<T: DeserializeOwned>(&self, user_id: &str) -> Option<T> {
        let entry = match self.cache.get(user_id, self.clock.now_ms()).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_value(entry.payload) {
            Ok(payload) => {
                debug!(user_id = %user_id, cache = "hit", "Serving cached payload");
                Some(payload)
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Cached payload has unexpected shape");
                None
            }
        }
    }

    async fn produce_and_store<T, F, Fut>(&self, user_id: &str, producer: F) -> ExchangeResult<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        debug!(user_id = %user_id, cache = "miss", "Fetching from upstream");
        let payload = producer().await?;

        let value = serde_json::to_value(&payload)?;
        if let Err(e) = self.cache.set(user_id, value, self.clock.now_ms()).await {
            warn!(user_id = %user_id, error = %e, "Cache write failed");
        }

        Ok(payload)
    }
}

/// 만료 항목 정리 작업.
///
/// `shutdown`이 취소되면 종료합니다.
pub fn spawn_sweeper(
    cache: Arc<dyn ResponseCache>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cache sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match cache.sweep(clock.now_ms()).await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "Swept expired cache entries"),
                        Err(e) => warn!(error = %e, "Cache sweep failed"),
                    }
                }
            }
        }
    })
}
