use crate::error::AlgoError;
use crate::models::order::OrderRequest;

/// 하위 주문 검증기 인터페이스
pub trait OrderValidator: Send + Sync {
    /// 주문 검증
    fn validate(&self, order: &OrderRequest) -> Result<(), AlgoError>;
}

/// 기본 주문 검증기 (수량/가격 범위)
pub struct BasicOrderValidator {
    min_order_size: f64,
    max_order_size: Option<f64>,
}

impl BasicOrderValidator {
    pub fn new(min_order_size: f64, max_order_size: Option<f64>) -> Self {
        BasicOrderValidator {
            min_order_size,
            max_order_size,
        }
    }
}

impl OrderValidator for BasicOrderValidator {
    fn validate(&self, order: &OrderRequest) -> Result<(), AlgoError> {
        // 주문 수량 검증
        if !(order.quantity > 0.0 && order.quantity.is_finite()) {
            return Err(AlgoError::InvalidOrder(format!(
                "Order quantity must be positive, got {}",
                order.quantity
            )));
        }

        if order.quantity < self.min_order_size {
            return Err(AlgoError::InvalidOrder(format!(
                "Order quantity too small, minimum: {}",
                self.min_order_size
            )));
        }

        if let Some(max) = self.max_order_size {
            if order.quantity > max {
                return Err(AlgoError::InvalidOrder(format!(
                    "Order quantity too large, maximum: {}",
                    max
                )));
            }
        }

        // 가격 검증
        if !(order.price > 0.0 && order.price.is_finite()) {
            return Err(AlgoError::InvalidOrder(format!(
                "Price must be positive, got {}",
                order.price
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::algo::AlgoId;
    use crate::models::order::{OrderId, OrderSide, OrderType};
    use rstest::rstest;

    fn request(price: f64, quantity: f64) -> OrderRequest {
        OrderRequest {
            order_id: OrderId::from("ALGO-000001"),
            algo_id: AlgoId::from("TWAP_1"),
            instrument: "XYZ".to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            price,
            quantity,
            reference: "TWAP_1".to_string(),
            created_at: 0,
        }
    }

    #[rstest]
    #[case(10.0, 5.0, true)]
    #[case(10.0, 0.5, false)]
    #[case(10.0, 150.0, false)]
    #[case(0.0, 5.0, false)]
    #[case(10.0, 0.0, false)]
    fn test_basic_validator(#[case] price: f64, #[case] quantity: f64, #[case] ok: bool) {
        let validator = BasicOrderValidator::new(1.0, Some(100.0));
        assert_eq!(validator.validate(&request(price, quantity)).is_ok(), ok);
    }

    #[test]
    fn test_unbounded_max() {
        let validator = BasicOrderValidator::new(0.0, None);
        assert!(validator.validate(&request(10.0, 1e9)).is_ok());
    }
}
