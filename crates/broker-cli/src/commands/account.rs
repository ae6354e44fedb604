//! 계좌 조회와 포지션 종료 명령.
//!
//! 자격증명은 `broker seal`로 만든 JSON 파일(암호문)에서 읽습니다.

use anyhow::{anyhow, bail, Context, Result};
use broker_core::{BrokerConfig, EncryptedCredentials};
use broker_exchange::{AccountSnapshot, CredentialBroker, ExchangeError, IncomeQuery};
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{error, info};

/// 저장된 자격증명 파일 로드.
pub fn load_credentials(path: &Path) -> Result<EncryptedCredentials> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid credentials file: {}", path.display()))
}

/// 계좌 스냅샷을 조회해 JSON 문자열로 반환.
pub async fn snapshot(
    config: &BrokerConfig,
    user_id: &str,
    credentials: &EncryptedCredentials,
) -> Result<String> {
    let broker = CredentialBroker::from_config(config).await?;
    let snapshot = broker
        .account_snapshot(user_id, credentials)
        .await
        .map_err(report)?;

    info!(
        balances = snapshot.balances.len(),
        positions = snapshot.positions.len(),
        "Snapshot fetched"
    );
    Ok(render(&snapshot)?)
}

/// 최근 `days`일의 수익 내역.
pub async fn income(
    config: &BrokerConfig,
    user_id: &str,
    credentials: &EncryptedCredentials,
    income_type: Option<String>,
    days: i64,
) -> Result<String> {
    let (start, end) = income_window(Utc::now(), days)?;
    let query = IncomeQuery {
        income_type,
        start_time: Some(start),
        end_time: Some(end),
    };

    let broker = CredentialBroker::from_config(config).await?;
    let records = broker
        .income(user_id, credentials, &query)
        .await
        .map_err(report)?;
    Ok(serde_json::to_string_pretty(&records)?)
}

/// 포지션 종료 (시장가 반대 주문).
///
/// `amount`는 부호 있는 현재 포지션 수량입니다 (음수 = 숏).
pub async fn close(
    config: &BrokerConfig,
    user_id: &str,
    credentials: &EncryptedCredentials,
    symbol: &str,
    amount: Decimal,
) -> Result<String> {
    let broker = CredentialBroker::from_config(config).await?;
    let ack = broker
        .close_position(user_id, credentials, symbol, amount)
        .await
        .map_err(report)?;
    Ok(serde_json::to_string_pretty(&ack)?)
}

/// 조회 기간 `[end - days, end]`. 1일 미만이거나 시각 범위를 벗어나면 에러.
fn income_window(end: DateTime<Utc>, days: i64) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    if days < 1 {
        bail!("--days must be at least 1 (got {})", days);
    }
    let start = TimeDelta::try_days(days)
        .and_then(|span| end.checked_sub_signed(span))
        .ok_or_else(|| anyhow!("--days is out of range: {}", days))?;
    Ok((start, end))
}

fn render(snapshot: &AccountSnapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

/// 운영자가 취할 조치를 로그로 남기고 에러를 그대로 전달.
fn report(err: ExchangeError) -> anyhow::Error {
    if err.requires_reconnect() {
        error!("Stored credentials were rejected; the exchange account must be reconnected");
    } else if err.is_retryable() {
        error!("Upstream temporarily unavailable; retry with a fresh request");
    }
    anyhow::Error::new(err)
}
