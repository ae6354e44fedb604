//! 응답 캐시.
//!
//! upstream의 키별 요청 한도를 지키기 위해 사용자별 계좌 스냅샷을
//! 짧은 TTL 동안 보관합니다. 만료 항목은 읽기 시점에 항상 없는 것으로
//! 취급되며, 주기적 정리는 메모리 관리 목적입니다.

mod memory;
#[cfg(feature = "redis-cache")]
mod redis;

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use self::redis::RedisResponseCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ExchangeResult;

/// 캐시 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 마지막 성공 응답
    pub payload: serde_json::Value,
    /// 저장 시각 (epoch 밀리초)
    pub stored_at_ms: u64,
}

impl CacheEntry {
    pub fn new(payload: serde_json::Value, stored_at_ms: u64) -> Self {
        Self {
            payload,
            stored_at_ms,
        }
    }

    /// `now - stored_at < ttl` 이면 유효.
    pub fn is_fresh(&self, now_ms: u64, ttl: Duration) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) < ttl.as_millis() as u64
    }
}

/// 교체 가능한 캐시 백엔드.
///
/// 테스트에서는 인스턴스별 메모리 캐시를, 다중 인스턴스 배포에서는
/// 공유 키-값 저장소를 주입합니다. 동시 쓰기는 마지막 쓰기가 이깁니다.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// 유효한 항목 조회. 만료된 항목은 `None`.
    async fn get(&self, key: &str, now_ms: u64) -> ExchangeResult<Option<CacheEntry>>;

    /// 항목 저장 (덮어쓰기).
    async fn set(&self, key: &str, payload: serde_json::Value, stored_at_ms: u64)
        -> ExchangeResult<()>;

    /// 항목 삭제.
    async fn remove(&self, key: &str) -> ExchangeResult<()>;

    /// 만료 항목 정리. 삭제된 항목 수를 반환합니다.
    async fn sweep(&self, now_ms: u64) -> ExchangeResult<usize>;

    /// 항목 유효 시간.
    fn ttl(&self) -> Duration;
}
