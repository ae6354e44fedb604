//! Binance USDⓈ-M 선물 REST 커넥터.
//!
//! 사용자 한 명의 API 키로 서명된 요청을 보내고 응답을 도메인 타입으로 변환합니다.
//! 재시도는 하지 않으며, 실패는 그대로 호출자에게 전달됩니다.

use async_trait::async_trait;
use broker_core::{ExchangeCredentials, ExchangeSettings};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{ExchangeError, ExchangeResult};
use crate::signing::{QueryParams, RequestSigner, SignedRequest};
use crate::traits::{
    AccountSnapshot, ExchangeClient, FuturesBalance, IncomeQuery, IncomeRecord, OrderAck,
    Position, Side,
};

const BALANCE_PATH: &str = "/fapi/v2/balance";
const POSITION_RISK_PATH: &str = "/fapi/v2/positionRisk";
const INCOME_PATH: &str = "/fapi/v1/income";
const ORDER_PATH: &str = "/fapi/v1/order";
const SERVER_TIME_PATH: &str = "/fapi/v1/time";

/// 선물 계좌 클라이언트.
pub struct FuturesClient {
    signer: RequestSigner,
    client: Client,
    clock: Arc<dyn Clock>,
}

impl FuturesClient {
    /// 새 클라이언트 생성.
    ///
    /// 요청 타임아웃은 `recvWindow`에 네트워크 여유분을 더한 값입니다.
    pub fn new(
        credentials: ExchangeCredentials,
        settings: &ExchangeSettings,
        clock: Arc<dyn Clock>,
    ) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ExchangeError::Configuration(e.to_string()))?;

        Ok(Self {
            signer: RequestSigner::new(credentials, settings, clock.clone()),
            client,
            clock,
        })
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    /// 임의 경로에 서명된 요청을 보내고 JSON 그대로 반환.
    pub async fn send_signed(
        &self,
        method: Method,
        path: &str,
        params: QueryParams,
    ) -> ExchangeResult<serde_json::Value> {
        let request = self
            .signer
            .build_authenticated_request(method, path, params)?;
        self.dispatch(request).await
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: QueryParams,
    ) -> ExchangeResult<T> {
        let request = self
            .signer
            .build_authenticated_request(Method::GET, path, params)?;
        self.dispatch(request).await
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str) -> ExchangeResult<T> {
        let url = format!("{}{}", self.signer.base_url(), path);
        debug!("GET {}", path);

        let response = self.client.get(&url).send().await?;
        Self::handle_response(response, path).await
    }

    /// 서명된 요청 전송.
    ///
    /// 로그에는 경로만 남기며 서명과 키는 남기지 않습니다.
    async fn dispatch<T: DeserializeOwned>(&self, request: SignedRequest) -> ExchangeResult<T> {
        let endpoint = request.endpoint().to_string();
        debug!("{} (signed) {}", request.method, endpoint);

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .header(request.api_key_header.as_str(), request.api_key.as_str());

        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body);
        }

        let response = builder.send().await.map_err(|e| {
            let err = ExchangeError::from(e);
            warn!(endpoint = %endpoint, error = %err, "Request failed");
            err
        })?;

        Self::handle_response(response, &endpoint).await
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(
                endpoint = %endpoint,
                status = status.as_u16(),
                "Upstream rejected request"
            );
            return Err(ExchangeError::upstream(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!(endpoint = %endpoint, "Failed to parse response: {}", e);
            ExchangeError::Parse(e.to_string())
        })
    }
}

impl std::fmt::Debug for FuturesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuturesClient")
            .field("signer", &self.signer)
            .finish()
    }
}

#[async_trait]
impl ExchangeClient for FuturesClient {
    async fn server_time(&self) -> ExchangeResult<i64> {
        let response: BinanceServerTime = self.public_get(SERVER_TIME_PATH).await?;
        Ok(response.server_time)
    }

    async fn balances(&self) -> ExchangeResult<Vec<FuturesBalance>> {
        let raw: Vec<BinanceFuturesBalance> =
            self.signed_get(BALANCE_PATH, QueryParams::new()).await?;
        Ok(raw.into_iter().map(FuturesBalance::from).collect())
    }

    async fn positions(&self) -> ExchangeResult<Vec<Position>> {
        let raw: Vec<BinancePositionRisk> =
            self.signed_get(POSITION_RISK_PATH, QueryParams::new()).await?;
        Ok(raw
            .into_iter()
            .filter(|p| !p.position_amt.is_zero())
            .map(Position::from)
            .collect())
    }

    async fn income(&self, query: &IncomeQuery) -> ExchangeResult<Vec<IncomeRecord>> {
        let mut params = QueryParams::new();
        if let Some(income_type) = &query.income_type {
            params.push("incomeType", income_type);
        }
        if let Some(start) = query.start_time {
            params.push("startTime", start.timestamp_millis());
        }
        if let Some(end) = query.end_time {
            params.push("endTime", end.timestamp_millis());
        }

        let raw: Vec<BinanceIncome> = self.signed_get(INCOME_PATH, params).await?;
        raw.into_iter().map(IncomeRecord::try_from).collect()
    }

    async fn close_position(
        &self,
        symbol: &str,
        position_amount: Decimal,
    ) -> ExchangeResult<OrderAck> {
        if position_amount.is_zero() {
            return Err(ExchangeError::InvalidRequest(format!(
                "no open position for {}",
                symbol
            )));
        }

        let side = Side::closing(position_amount);
        let params = QueryParams::new()
            .with("symbol", symbol)
            .with("side", side.as_str())
            .with("type", "MARKET")
            .with("quantity", position_amount.abs());

        info!(symbol = %symbol, side = side.as_str(), "Closing position");

        let request = self.signer.build_order_request(ORDER_PATH, params)?;
        let raw: BinanceOrderResponse = self.dispatch(request).await?;
        Ok(raw.into())
    }

    async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot> {
        let balances = self.balances().await?;
        let positions = self.positions().await?;

        Ok(AccountSnapshot {
            balances,
            positions,
            fetched_at_ms: self.clock.now_ms(),
        })
    }
}

// ============================================================================
// Binance 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceServerTime {
    server_time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceFuturesBalance {
    asset: String,
    balance: Decimal,
    available_balance: Decimal,
    #[serde(default)]
    cross_un_pnl: Decimal,
}

impl From<BinanceFuturesBalance> for FuturesBalance {
    fn from(raw: BinanceFuturesBalance) -> Self {
        Self {
            asset: raw.asset,
            balance: raw.balance,
            available_balance: raw.available_balance,
            cross_unrealized_pnl: raw.cross_un_pnl,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinancePositionRisk {
    symbol: String,
    position_amt: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
    #[serde(rename = "unRealizedProfit")]
    unrealized_profit: Decimal,
    leverage: Decimal,
    #[serde(default = "default_position_side")]
    position_side: String,
}

fn default_position_side() -> String {
    "BOTH".to_string()
}

impl From<BinancePositionRisk> for Position {
    fn from(raw: BinancePositionRisk) -> Self {
        Self {
            symbol: raw.symbol,
            amount: raw.position_amt,
            entry_price: raw.entry_price,
            mark_price: raw.mark_price,
            unrealized_pnl: raw.unrealized_profit,
            leverage: raw.leverage,
            position_side: raw.position_side,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceIncome {
    #[serde(default)]
    symbol: String,
    income_type: String,
    income: Decimal,
    asset: String,
    time: i64,
}

impl TryFrom<BinanceIncome> for IncomeRecord {
    type Error = ExchangeError;

    fn try_from(raw: BinanceIncome) -> Result<Self, Self::Error> {
        Ok(Self {
            symbol: raw.symbol,
            income_type: raw.income_type,
            income: raw.income,
            asset: raw.asset,
            time: millis_to_datetime(raw.time)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrderResponse {
    order_id: i64,
    symbol: String,
    side: Side,
    status: String,
    #[serde(default)]
    executed_qty: Decimal,
}

impl From<BinanceOrderResponse> for OrderAck {
    fn from(raw: BinanceOrderResponse) -> Self {
        Self {
            order_id: raw.order_id,
            symbol: raw.symbol,
            side: raw.side,
            status: raw.status,
            executed_quantity: raw.executed_qty,
        }
    }
}

fn millis_to_datetime(millis: i64) -> ExchangeResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ExchangeError::Parse(format!("invalid timestamp: {}", millis)))
}
