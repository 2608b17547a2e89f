use serde::{Deserialize, Serialize};

use crate::models::order::OrderSide;

/// 호가 스냅샷 (최우선 매수/매도 호가 + 최종 체결가)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub instrument: String,
    pub bid_price: f64,
    pub bid_volume: f64,
    pub ask_price: f64,
    pub ask_volume: f64,
    pub last_price: f64,
    pub timestamp: i64,
}

impl TickSnapshot {
    pub fn new(
        instrument: impl Into<String>,
        bid_price: f64,
        ask_price: f64,
        last_price: f64,
        timestamp: i64,
    ) -> Self {
        TickSnapshot {
            instrument: instrument.into(),
            bid_price,
            bid_volume: 0.0,
            ask_price,
            ask_volume: 0.0,
            last_price,
            timestamp,
        }
    }

    pub fn with_volumes(mut self, bid_volume: f64, ask_volume: f64) -> Self {
        self.bid_volume = bid_volume;
        self.ask_volume = ask_volume;
        self
    }

    /// 주문 방향 쪽 최우선 호가 (매수 → bid, 매도 → ask)
    pub fn own_price(&self, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.bid_price,
            OrderSide::Sell => self.ask_price,
        }
    }

    /// 반대편 최우선 호가 (매수 → ask, 매도 → bid)
    pub fn opposite_price(&self, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.ask_price,
            OrderSide::Sell => self.bid_price,
        }
    }

    pub fn opposite_volume(&self, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.ask_volume,
            OrderSide::Sell => self.bid_volume,
        }
    }

    /// 양쪽 호가가 모두 유효한지
    pub fn has_quotes(&self) -> bool {
        self.bid_price > 0.0 && self.ask_price > 0.0
    }

    pub fn mid(&self) -> f64 {
        (self.bid_price + self.ask_price) / 2.0
    }
}
