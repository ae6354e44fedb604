//! 자격증명 브로커.
//!
//! 저장된 암호문을 요청 시점에만 복호화해 거래소 클라이언트를 만들고,
//! 계좌 스냅샷은 사용자별 짧은 TTL 캐시를 거쳐 제공합니다.

use broker_core::{
    BrokerConfig, CredentialCipher, EncryptedCredentials, EnvelopeCipher, ExchangeSettings,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cache::{MemoryCache, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::connector::FuturesClient;
use crate::error::ExchangeResult;
use crate::fetcher::CachedFetcher;
use crate::traits::{AccountSnapshot, ExchangeClient, IncomeQuery, IncomeRecord, OrderAck};

/// 사용자별 거래소 호출 진입점.
pub struct CredentialBroker {
    cipher: Arc<dyn CredentialCipher>,
    settings: ExchangeSettings,
    fetcher: Arc<CachedFetcher>,
    clock: Arc<dyn Clock>,
}

impl CredentialBroker {
    pub fn new(
        cipher: Arc<dyn CredentialCipher>,
        settings: ExchangeSettings,
        fetcher: Arc<CachedFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cipher,
            settings,
            fetcher,
            clock,
        }
    }

    /// 설정에서 브로커 구성.
    ///
    /// `cache.redis_url`이 있고 `redis-cache` 기능이 켜져 있으면 Redis 캐시를,
    /// 아니면 프로세스 메모리 캐시를 사용합니다.
    pub async fn from_config(config: &BrokerConfig) -> ExchangeResult<Self> {
        let cipher = EnvelopeCipher::from_settings(&config.encryption)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = build_cache(config).await?;

        let fetcher = CachedFetcher::new(cache, clock.clone())
            .with_dedupe(config.cache.dedupe_in_flight);

        info!(
            base_url = %config.exchange.rest_base_url(),
            ttl_secs = config.cache.ttl_secs,
            "Credential broker initialized"
        );

        Ok(Self::new(
            Arc::new(cipher),
            config.exchange.clone(),
            Arc::new(fetcher),
            clock,
        ))
    }

    pub fn fetcher(&self) -> &Arc<CachedFetcher> {
        &self.fetcher
    }

    /// 저장된 자격증명을 복호화해 클라이언트 생성.
    ///
    /// 평문 시크릿은 반환된 클라이언트 안에만 머뭅니다.
    pub fn client_for(&self, stored: &EncryptedCredentials) -> ExchangeResult<FuturesClient> {
        let credentials = stored.open(self.cipher.as_ref())?;
        FuturesClient::new(credentials, &self.settings, self.clock.clone())
    }

    /// 계좌 스냅샷 (캐시 경유).
    ///
    /// 캐시가 유효하면 복호화와 upstream 호출 없이 반환합니다.
    #[instrument(skip(self, stored))]
    pub async fn account_snapshot(
        &self,
        user_id: &str,
        stored: &EncryptedCredentials,
    ) -> ExchangeResult<AccountSnapshot> {
        self.fetcher
            .fetch_with_cache(user_id, move || async move {
                let client = self.client_for(stored)?;
                client.account_snapshot().await
            })
            .await
    }

    /// 수익 내역 (캐시하지 않음).
    #[instrument(skip(self, stored, query))]
    pub async fn income(
        &self,
        user_id: &str,
        stored: &EncryptedCredentials,
        query: &IncomeQuery,
    ) -> ExchangeResult<Vec<IncomeRecord>> {
        self.client_for(stored)?.income(query).await
    }

    /// 포지션 종료.
    ///
    /// 캐시를 거치지 않으며, 성공하면 사용자 스냅샷 캐시를 무효화합니다.
    #[instrument(skip(self, stored))]
    pub async fn close_position(
        &self,
        user_id: &str,
        stored: &EncryptedCredentials,
        symbol: &str,
        position_amount: Decimal,
    ) -> ExchangeResult<OrderAck> {
        let ack = self
            .client_for(stored)?
            .close_position(symbol, position_amount)
            .await?;

        if let Err(e) = self.fetcher.invalidate(user_id).await {
            warn!(error = %e, "Failed to invalidate snapshot cache");
        }

        Ok(ack)
    }

    /// 캐시 정리 작업 시작.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        self.fetcher.spawn_sweeper(interval, shutdown)
    }
}

#[cfg(feature = "redis-cache")]
async fn build_cache(config: &BrokerConfig) -> ExchangeResult<Arc<dyn ResponseCache>> {
    match &config.cache.redis_url {
        Some(url) => {
            let cache = crate::cache::RedisResponseCache::connect(url, config.cache.ttl()).await?;
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(MemoryCache::new(config.cache.ttl()))),
    }
}

#[cfg(not(feature = "redis-cache"))]
async fn build_cache(config: &BrokerConfig) -> ExchangeResult<Arc<dyn ResponseCache>> {
    if config.cache.redis_url.is_some() {
        warn!("cache.redis_url is set but redis-cache feature is disabled, using memory cache");
    }
    Ok(Arc::new(MemoryCache::new(config.cache.ttl())))
}
