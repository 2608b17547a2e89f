use serde::{Deserialize, Serialize};

use crate::models::order::OrderId;

/// 체결 이벤트
///
/// `fill_id` 기준으로 한 번만 원장에 반영된다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: String,
    pub order_id: OrderId,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: i64,
}

impl Fill {
    pub fn new(
        fill_id: impl Into<String>,
        order_id: OrderId,
        price: f64,
        quantity: f64,
        timestamp: i64,
    ) -> Self {
        Fill {
            fill_id: fill_id.into(),
            order_id,
            price,
            quantity,
            timestamp,
        }
    }

    pub fn value(&self) -> f64 {
        self.price * self.quantity
    }
}
