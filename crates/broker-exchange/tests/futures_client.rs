//! 모의 서버를 상대로 한 선물 클라이언트 통합 테스트.
//!
//! 시계를 고정해 쿼리 순서와 서명까지 정확히 비교합니다.

use broker_core::{
    EncryptedCredentials, EnvelopeCipher, ExchangeCredentials, ExchangeSettings, MasterKey,
};
use broker_exchange::{
    CachedFetcher, Clock, CredentialBroker, ExchangeClient, ExchangeError, FuturesClient,
    IncomeQuery, ManualClock, MemoryCache, Side,
};
use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};
use rust_decimal_macros::dec;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

const NOW_MS: u64 = 1_700_000_000_000;
const EMPTY_QUERY_SIGNATURE: &str =
    "52713c242e41357b33f1eeba15ca7207838d2487182ac9873a8d305ae59b0d8b";

const BALANCE_BODY: &str = r#"[{"accountAlias":"SgsR","asset":"USDT","balance":"1000.50",
    "crossWalletBalance":"1000.50","crossUnPnl":"12.5","availableBalance":"900.25",
    "maxWithdrawAmount":"900.25","marginAvailable":true,"updateTime":1700000000000}]"#;

const POSITION_BODY: &str = r#"[
    {"symbol":"BTCUSDT","positionAmt":"0.010","entryPrice":"40000","markPrice":"41250",
     "unRealizedProfit":"12.5","leverage":"10","positionSide":"BOTH"},
    {"symbol":"ETHUSDT","positionAmt":"0","entryPrice":"0","markPrice":"2200",
     "unRealizedProfit":"0","leverage":"10","positionSide":"BOTH"}]"#;

fn settings(base_url: String) -> ExchangeSettings {
    ExchangeSettings {
        rest_base_url: Some(base_url),
        ..Default::default()
    }
}

fn client(server: &Server) -> FuturesClient {
    FuturesClient::new(
        ExchangeCredentials::new("test-api-key", "secret"),
        &settings(server.url()),
        Arc::new(ManualClock::new(NOW_MS)),
    )
    .unwrap()
}

fn signed_empty_query() -> Matcher {
    Matcher::Exact(format!(
        "timestamp={}&recvWindow=5000&signature={}",
        NOW_MS, EMPTY_QUERY_SIGNATURE
    ))
}

#[tokio::test]
async fn test_balances_sends_key_header_and_signed_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v2/balance")
        .match_header("X-MBX-APIKEY", "test-api-key")
        .match_query(signed_empty_query())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(BALANCE_BODY)
        .create_async()
        .await;

    let balances = client(&server).balances().await.unwrap();

    mock.assert_async().await;
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].asset, "USDT");
    assert_eq!(balances[0].balance, dec!(1000.50));
    assert_eq!(balances[0].available_balance, dec!(900.25));
}

#[tokio::test]
async fn test_positions_filters_flat_entries() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(signed_empty_query())
        .with_status(200)
        .with_body(POSITION_BODY)
        .create_async()
        .await;

    let positions = client(&server).positions().await.unwrap();

    mock.assert_async().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].symbol, "BTCUSDT");
    assert_eq!(positions[0].unrealized_pnl, dec!(12.5));
}

#[tokio::test]
async fn test_income_query_order() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/income")
        .match_query(Matcher::Exact(
            "incomeType=REALIZED_PNL&startTime=1699900000000&endTime=1700000000000\
             &timestamp=1700000000000&recvWindow=5000\
             &signature=599812ca49b5c2772ddafaad7e9ede98b31babdc364de77bc2832a182de89db1"
                .to_string(),
        ))
        .with_status(200)
        .with_body(
            r#"[{"symbol":"BTCUSDT","incomeType":"REALIZED_PNL","income":"-0.375",
                "asset":"USDT","info":"","time":1699950000000,"tranId":1,"tradeId":"2"}]"#,
        )
        .create_async()
        .await;

    let query = IncomeQuery {
        income_type: Some("REALIZED_PNL".to_string()),
        start_time: Utc.timestamp_millis_opt(1_699_900_000_000).single(),
        end_time: Utc.timestamp_millis_opt(1_700_000_000_000).single(),
    };
    let records = client(&server).income(&query).await.unwrap();

    mock.assert_async().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].income, dec!(-0.375));
}

#[tokio::test]
async fn test_close_long_position_posts_sell_market_order() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/fapi/v1/order")
        .match_header("X-MBX-APIKEY", "test-api-key")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::Exact(
            "symbol=BTCUSDT&side=SELL&type=MARKET&quantity=0.010&timestamp=1700000000000\
             &signature=344c88014145aae607dd3f1a1cf17eaddca4a21f2e0ece94bfca44abda1ccb99"
                .to_string(),
        ))
        .with_status(200)
        .with_body(
            r#"{"orderId":42,"symbol":"BTCUSDT","status":"NEW","side":"SELL",
                "type":"MARKET","origQty":"0.010","executedQty":"0"}"#,
        )
        .create_async()
        .await;

    let ack = client(&server)
        .close_position("BTCUSDT", dec!(0.010))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(ack.order_id, 42);
    assert_eq!(ack.side, Side::Sell);
}

#[tokio::test]
async fn test_close_short_position_buys_absolute_amount() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/fapi/v1/order")
        .match_body(Matcher::Exact(
            "symbol=ETHUSDT&side=BUY&type=MARKET&quantity=1.5&timestamp=1700000000000\
             &signature=2118572b890e94fa5468c48939c40a17d03e686087e0f4ef06824c843a46c0c2"
                .to_string(),
        ))
        .with_status(200)
        .with_body(
            r#"{"orderId":43,"symbol":"ETHUSDT","status":"FILLED","side":"BUY",
                "executedQty":"1.5"}"#,
        )
        .create_async()
        .await;

    let ack = client(&server)
        .close_position("ETHUSDT", dec!(-1.5))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(ack.side, Side::Buy);
    assert_eq!(ack.executed_quantity, dec!(1.5));
}

#[tokio::test]
async fn test_unauthorized_maps_to_upstream_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
        .create_async()
        .await;

    let err = client(&server).balances().await.unwrap_err();

    match &err {
        ExchangeError::Upstream { status, code, body } => {
            assert_eq!(*status, 401);
            assert_eq!(*code, Some(-2015));
            assert!(body.contains("Invalid API-key"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.requires_reconnect());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let err = client(&server).positions().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_success_body_is_parse_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let err = client(&server).balances().await.unwrap_err();
    assert!(matches!(err, ExchangeError::Parse(_)));
}

#[tokio::test]
async fn test_server_time_is_unsigned() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/time")
        .match_header("X-MBX-APIKEY", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"serverTime":1700000000123}"#)
        .create_async()
        .await;

    let time = client(&server).server_time().await.unwrap();

    mock.assert_async().await;
    assert_eq!(time, 1_700_000_000_123);
}

/// 헤더는 즉시 보내고 본문은 `delay` 뒤에 보내는 응답.
fn stalled_body(
    delay: Duration,
    body: &'static str,
) -> impl Fn(&mut dyn Write) -> io::Result<()> + Send + Sync + 'static {
    move |w| {
        std::thread::sleep(delay);
        w.write_all(body.as_bytes())
    }
}

#[tokio::test]
async fn test_slow_upstream_times_out_without_caching() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_chunked_body(stalled_body(Duration::from_millis(500), BALANCE_BODY))
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_chunked_body(stalled_body(Duration::from_millis(500), POSITION_BODY))
        .create_async()
        .await;

    let tight = ExchangeSettings {
        recv_window_ms: 5,
        network_allowance_ms: 5,
        ..settings(server.url())
    };
    assert_eq!(tight.request_timeout(), Duration::from_millis(10));

    let clock = Arc::new(ManualClock::new(NOW_MS));
    let client = FuturesClient::new(
        ExchangeCredentials::new("test-api-key", "secret"),
        &tight,
        clock.clone(),
    )
    .unwrap();

    let err = client.balances().await.unwrap_err();
    assert!(matches!(err, ExchangeError::Timeout(_)), "{:?}", err);
    assert!(err.is_upstream());
    assert!(err.is_retryable());
    assert!(!err.requires_reconnect());

    let master_key = MasterKey::from_material("integration-test-master-key").unwrap();
    let cipher = Arc::new(EnvelopeCipher::new(&master_key));
    let stored = EncryptedCredentials::seal(
        cipher.as_ref(),
        &ExchangeCredentials::new("test-api-key", "secret"),
    )
    .unwrap();

    let cache = Arc::new(MemoryCache::new(Duration::from_secs(8)));
    let fetcher = Arc::new(CachedFetcher::new(cache.clone(), clock.clone()));
    let broker = CredentialBroker::new(cipher, tight, fetcher, clock);

    let err = broker.account_snapshot("user-1", &stored).await.unwrap_err();
    assert!(matches!(err, ExchangeError::Timeout(_)), "{:?}", err);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_broker_serves_snapshot_from_cache_within_ttl() {
    let mut server = Server::new_async().await;
    let balance = server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(BALANCE_BODY)
        .expect(2)
        .create_async()
        .await;
    let positions = server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(POSITION_BODY)
        .expect(2)
        .create_async()
        .await;

    let master_key = MasterKey::from_material("integration-test-master-key").unwrap();
    let cipher = Arc::new(EnvelopeCipher::new(&master_key));
    let stored = EncryptedCredentials::seal(
        cipher.as_ref(),
        &ExchangeCredentials::new("test-api-key", "secret"),
    )
    .unwrap();

    let clock = Arc::new(ManualClock::new(NOW_MS));
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(8)));
    let fetcher = Arc::new(CachedFetcher::new(cache, clock.clone()));
    let broker = CredentialBroker::new(cipher, settings(server.url()), fetcher, clock.clone());

    let first = broker.account_snapshot("user-1", &stored).await.unwrap();
    assert_eq!(first.fetched_at_ms, NOW_MS);
    assert_eq!(first.positions.len(), 1);

    clock.advance(Duration::from_millis(7_900));
    let cached = broker.account_snapshot("user-1", &stored).await.unwrap();
    assert_eq!(cached, first);

    clock.advance(Duration::from_millis(200));
    let refreshed = broker.account_snapshot("user-1", &stored).await.unwrap();
    assert_eq!(refreshed.fetched_at_ms, clock.now_ms());

    balance.assert_async().await;
    positions.assert_async().await;
}

#[tokio::test]
async fn test_broker_close_position_invalidates_snapshot() {
    let mut server = Server::new_async().await;
    let balance = server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(BALANCE_BODY)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(POSITION_BODY)
        .create_async()
        .await;
    server
        .mock("POST", "/fapi/v1/order")
        .with_status(200)
        .with_body(
            r#"{"orderId":7,"symbol":"BTCUSDT","status":"FILLED","side":"SELL",
                "executedQty":"0.010"}"#,
        )
        .create_async()
        .await;

    let master_key = MasterKey::from_material("integration-test-master-key").unwrap();
    let cipher = Arc::new(EnvelopeCipher::new(&master_key));
    let stored = EncryptedCredentials::seal(
        cipher.as_ref(),
        &ExchangeCredentials::new("test-api-key", "secret"),
    )
    .unwrap();

    let clock = Arc::new(ManualClock::new(NOW_MS));
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(8)));
    let fetcher = Arc::new(CachedFetcher::new(cache, clock.clone()));
    let broker = CredentialBroker::new(cipher, settings(server.url()), fetcher, clock);

    broker.account_snapshot("user-1", &stored).await.unwrap();
    broker
        .close_position("user-1", &stored, "BTCUSDT", dec!(0.010))
        .await
        .unwrap();
    broker.account_snapshot("user-1", &stored).await.unwrap();

    balance.assert_async().await;
}
