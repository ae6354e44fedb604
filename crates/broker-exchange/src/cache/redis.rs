//! Redis 공유 캐시.
//!
//! 여러 인스턴스가 같은 사용자 스냅샷을 공유할 때 사용합니다.
//! 항목은 서버 측에서도 `SET EX`로 만료되므로 `sweep`은 할 일이 없습니다.

use async_trait::async_trait;
use ::redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::info;

use super::{CacheEntry, ResponseCache};
use crate::error::{ExchangeError, ExchangeResult};

const KEY_PREFIX: &str = "broker:snapshot:";

/// Redis 기반 응답 캐시.
#[derive(Clone)]
pub struct RedisResponseCache {
    connection: ConnectionManager,
    ttl: Duration,
}

impl RedisResponseCache {
    /// Redis에 연결합니다.
    pub async fn connect(url: &str, ttl: Duration) -> ExchangeResult<Self> {
        info!("Connecting to Redis response cache...");

        let client = Client::open(url).map_err(|e| ExchangeError::Cache(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| ExchangeError::Cache(e.to_string()))?;

        info!("Redis response cache connected");
        Ok(Self { connection, ttl })
    }

    fn key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    /// 서버 측 만료 시간 (초, 올림).
    fn expire_secs(&self) -> u64 {
        let millis = self.ttl.as_millis() as u64;
        millis.div_ceil(1000).max(1)
    }
}

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, key: &str, now_ms: u64) -> ExchangeResult<Option<CacheEntry>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .get(Self::key(key))
            .await
            .map_err(|e| ExchangeError::Cache(e.to_string()))?;

        match value {
            Some(json) => {
                let entry: CacheEntry = serde_json::from_str(&json)?;
                Ok(entry.is_fresh(now_ms, self.ttl).then_some(entry))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        payload: serde_json::Value,
        stored_at_ms: u64,
    ) -> ExchangeResult<()> {
        let json = serde_json::to_string(&CacheEntry::new(payload, stored_at_ms))?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(Self::key(key), json, self.expire_secs())
            .await
            .map_err(|e| ExchangeError::Cache(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> ExchangeResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .del(Self::key(key))
            .await
            .map_err(|e| ExchangeError::Cache(e.to_string()))?;
        Ok(())
    }

    async fn sweep(&self, _now_ms: u64) -> ExchangeResult<usize> {
        Ok(0)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_key_prefix() {
        assert_eq!(
            super::RedisResponseCache::key("user-1"),
            "broker:snapshot:user-1"
        );
    }
}
