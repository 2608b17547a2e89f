use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AlgoError;
use crate::models::algo::AlgoId;
use crate::utils::current_timestamp_ms;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        OrderId(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderSide {
    #[serde(alias = "buy", alias = "BUY", alias = "long", alias = "Long")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "short", alias = "Short")]
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "Buy"),
            OrderSide::Sell => write!(f, "Sell"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = AlgoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "long" | "b" => Ok(OrderSide::Buy),
            "sell" | "short" | "s" => Ok(OrderSide::Sell),
            other => Err(AlgoError::ParseError(format!("Unknown order side: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

/// 하위 주문 상태
///
/// `Submitting` 은 게이트웨이 응답 전 원장에 먼저 기록된 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Submitting,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// 아직 체결/취소 가능한 상태인지
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Submitting | OrderStatus::Submitted | OrderStatus::PartiallyFilled
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Submitting => "Submitting",
            OrderStatus::Submitted => "Submitted",
            OrderStatus::PartiallyFilled => "PartiallyFilled",
            OrderStatus::Filled => "Filled",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Rejected => "Rejected",
            OrderStatus::Expired => "Expired",
        };
        write!(f, "{}", s)
    }
}

/// 템플릿이 결정한 하위 주문 사양 (가격/수량)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub price: f64,
    pub quantity: f64,
    pub order_type: OrderType,
}

impl OrderSpec {
    pub fn limit(price: f64, quantity: f64) -> Self {
        OrderSpec {
            price,
            quantity,
            order_type: OrderType::Limit,
        }
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }
}

/// Request sent to the gateway for one child order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Local id assigned by the engine before the gateway sees the order
    pub order_id: OrderId,
    pub algo_id: AlgoId,
    pub instrument: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: f64,
    pub quantity: f64,
    pub reference: String,
    pub created_at: i64,
}

/// Request sent to the gateway to cancel one child order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub order_id: OrderId,
    pub exchange_order_id: Option<OrderId>,
    pub instrument: String,
}

/// 알고리즘 인스턴스가 낸 하위 주문
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildOrder {
    pub order_id: OrderId,
    pub exchange_order_id: Option<OrderId>,
    pub algo_id: AlgoId,
    pub instrument: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: f64,
    pub quantity: f64,
    /// 원장에 반영된 체결 수량
    pub filled: f64,
    /// 게이트웨이가 보고한 누적 체결 수량
    pub traded: f64,
    pub status: OrderStatus,
    pub cancel_requested: bool,
    pub created_at: i64,
}

impl ChildOrder {
    pub fn from_request(request: &OrderRequest) -> Self {
        ChildOrder {
            order_id: request.order_id.clone(),
            exchange_order_id: None,
            algo_id: request.algo_id.clone(),
            instrument: request.instrument.clone(),
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            quantity: request.quantity,
            filled: 0.0,
            traded: 0.0,
            status: OrderStatus::Submitting,
            cancel_requested: false,
            created_at: request.created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// 이 주문이 목표 수량에서 점유하는 수량
    ///
    /// 활성 주문은 전체 수량, 종료 주문은 실제 체결된 만큼만 점유
    pub fn committed(&self) -> f64 {
        if self.is_active() {
            self.quantity
        } else {
            self.filled.max(self.traded)
        }
    }

    pub fn cancel_request(&self) -> CancelRequest {
        CancelRequest {
            order_id: self.order_id.clone(),
            exchange_order_id: self.exchange_order_id.clone(),
            instrument: self.instrument.clone(),
        }
    }
}

/// Order status event delivered by the gateway.
///
/// `order_id` may be either the local id or the exchange id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
    /// Cumulative traded quantity reported by the gateway
    pub traded: f64,
    pub timestamp: i64,
}

impl OrderUpdate {
    pub fn new(order_id: impl Into<String>, status: OrderStatus, traded: f64) -> Self {
        OrderUpdate {
            order_id: OrderId(order_id.into()),
            status,
            traded,
            timestamp: current_timestamp_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_parsing() {
        assert_eq!("buy".parse::<OrderSide>().unwrap(), OrderSide::Buy);
        assert_eq!(" SHORT ".parse::<OrderSide>().unwrap(), OrderSide::Sell);
        assert!("hold".parse::<OrderSide>().is_err());
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn test_committed_quantity() {
        let request = OrderRequest {
            order_id: OrderId::from("ALGO-000001"),
            algo_id: AlgoId::from("TWAP_1"),
            instrument: "XYZ".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: 10.0,
            quantity: 20.0,
            reference: "test".to_string(),
            created_at: 0,
        };
        let mut order = ChildOrder::from_request(&request);
        assert_eq!(order.committed(), 20.0);

        order.status = OrderStatus::Cancelled;
        order.traded = 5.0;
        assert_eq!(order.committed(), 5.0);

        order.filled = 7.0;
        assert_eq!(order.committed(), 7.0);
    }
}
