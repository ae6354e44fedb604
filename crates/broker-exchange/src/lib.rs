//! # Broker Exchange
//!
//! 사용자별 API 키로 서명된 거래소 REST 요청과 짧은 TTL 응답 캐시를 제공합니다.
//!
//! - HMAC-SHA256 요청 서명 (`RequestSigner`)
//! - Binance USDⓈ-M 선물 커넥터 (`FuturesClient`)
//! - 사용자별 응답 캐시 (`CachedFetcher`)
//! - 복호화부터 캐시 조회까지 묶은 `CredentialBroker`

pub mod broker;
pub mod cache;
pub mod clock;
pub mod connector;
pub mod error;
pub mod fetcher;
pub mod signing;
pub mod traits;

pub use broker::CredentialBroker;
pub use cache::{CacheEntry, MemoryCache, ResponseCache};
#[cfg(feature = "redis-cache")]
pub use cache::RedisResponseCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use connector::FuturesClient;
pub use error::{ExchangeError, ExchangeResult};
pub use fetcher::{spawn_sweeper, CachedFetcher};
pub use signing::{sign_query, QueryParams, RequestSigner, SignedRequest};
pub use traits::{
    AccountSnapshot, ExchangeClient, FuturesBalance, IncomeQuery, IncomeRecord, OrderAck,
    Position, Side,
};
