//! 거래소 클라이언트 인터페이스와 계좌 타입.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeResult;

/// 주문 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// 포지션을 종료하는 방향 (롱 → 매도, 숏 → 매수).
    pub fn closing(position_amount: Decimal) -> Self {
        if position_amount.is_sign_negative() {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

/// 선물 지갑 잔고.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesBalance {
    pub asset: String,
    /// 지갑 잔고
    pub balance: Decimal,
    /// 주문 가능 잔고
    pub available_balance: Decimal,
    /// 교차 마진 미실현 손익
    pub cross_unrealized_pnl: Decimal,
}

/// 열린 포지션.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// 부호 있는 수량 (음수 = 숏)
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: Decimal,
    /// BOTH, LONG, SHORT
    pub position_side: String,
}

/// 수익/비용 내역 한 건.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub symbol: String,
    pub income_type: String,
    pub income: Decimal,
    pub asset: String,
    pub time: DateTime<Utc>,
}

/// 수익 내역 조회 조건.
///
/// 파라미터는 `incomeType`, `startTime`, `endTime` 순서로 직렬화됩니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomeQuery {
    /// REALIZED_PNL, FUNDING_FEE, COMMISSION 등
    pub income_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// 주문 접수 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: i64,
    pub symbol: String,
    pub side: Side,
    pub status: String,
    pub executed_quantity: Decimal,
}

/// 대시보드용 계좌 스냅샷 (잔고 + 열린 포지션).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balances: Vec<FuturesBalance>,
    pub positions: Vec<Position>,
    /// upstream 조회 시각 (epoch 밀리초)
    pub fetched_at_ms: u64,
}

impl AccountSnapshot {
    /// 열린 포지션의 미실현 손익 합계.
    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.positions.iter().map(|p| p.unrealized_pnl).sum()
    }

    /// 특정 자산 잔고.
    pub fn balance(&self, asset: &str) -> Option<&FuturesBalance> {
        self.balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
    }
}

/// 사용자 API 키로 인증된 거래소 클라이언트.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 서버 시간 (연결 확인용, 서명 불필요).
    async fn server_time(&self) -> ExchangeResult<i64>;

    /// 선물 지갑 잔고.
    async fn balances(&self) -> ExchangeResult<Vec<FuturesBalance>>;

    /// 수량이 0이 아닌 포지션.
    async fn positions(&self) -> ExchangeResult<Vec<Position>>;

    /// 수익/비용 내역.
    async fn income(&self, query: &IncomeQuery) -> ExchangeResult<Vec<IncomeRecord>>;

    /// 시장가 반대 주문으로 포지션 종료.
    async fn close_position(&self, symbol: &str, position_amount: Decimal)
        -> ExchangeResult<OrderAck>;

    /// 잔고와 포지션을 묶은 스냅샷.
    async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot>;
}
