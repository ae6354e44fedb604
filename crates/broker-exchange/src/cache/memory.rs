//! 프로세스 메모리 캐시.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{CacheEntry, ResponseCache};
use crate::error::ExchangeResult;

/// 인스턴스가 살아 있는 동안만 유지되는 캐시.
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 만료 여부와 관계없이 보관 중인 항목 수.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str, now_ms: u64) -> ExchangeResult<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_fresh(now_ms, self.ttl))
            .cloned())
    }

    async fn set(
        &self,
        key: &str,
        payload: serde_json::Value,
        stored_at_ms: u64,
    ) -> ExchangeResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheEntry::new(payload, stored_at_ms));
        Ok(())
    }

    async fn remove(&self, key: &str) -> ExchangeResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn sweep(&self, now_ms: u64) -> ExchangeResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now_ms, self.ttl));
        Ok(before - entries.len())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
