//! Iceberg 전략
//!
//! 대량 주문 중 `display_volume` 만큼만 호가창에 노출하고,
//! 노출 주문이 종료(체결/취소)되면 즉시 다음 노출 주문을 제출

use serde_json::json;
use std::time::Duration;

use crate::error::AlgoError;
use crate::models::algo::AlgoParams;
use crate::models::market_data::TickSnapshot;
use crate::models::order::{ChildOrder, OrderSide, OrderSpec, OrderStatus};
use crate::strategies::{ensure_positive, AlgoAction, AlgoContext, AlgoTemplate, RejectCounter, TemplateKind};
use crate::utils::math::qty_is_zero;

/// Iceberg 실행 알고리즘
pub struct IcebergAlgo {
    /// 시장에 노출할 부분 수량
    display_volume: f64,
    /// 미체결 노출 주문 점검 주기 (없으면 점검 안 함)
    check_interval: Option<Duration>,
    elapsed: Duration,
    /// 제출한 노출 주문 수
    slices_sent: u64,
    rejects: RejectCounter,
}

impl IcebergAlgo {
    pub fn from_params(params: &AlgoParams) -> Result<Self, AlgoError> {
        let display_volume = params.require_f64("display_volume")?;
        let check_interval = match params.get_f64("interval")? {
            Some(secs) if secs > 0.0 && secs.is_finite() => Some(Duration::from_secs_f64(secs)),
            Some(secs) if secs == 0.0 => None,
            Some(secs) => {
                return Err(AlgoError::ConfigError(format!(
                    "interval must not be negative, got {}",
                    secs
                )))
            }
            None => None,
        };

        Ok(IcebergAlgo {
            display_volume,
            check_interval,
            elapsed: Duration::ZERO,
            slices_sent: 0,
            rejects: RejectCounter::default(),
        })
    }

    /// 노출 주문 가격: 부모 지정가, 없으면 주문 방향 최우선 호가
    fn quote_price(&self, ctx: &AlgoContext<'_>) -> Option<f64> {
        match ctx.price {
            Some(price) => Some(price),
            None => ctx
                .tick
                .filter(|t| t.has_quotes())
                .map(|t| t.own_price(ctx.side)),
        }
    }

    fn next_slice(&mut self, ctx: &AlgoContext<'_>) -> Vec<AlgoAction> {
        if ctx.has_active_orders() {
            return Vec::new();
        }

        let quantity = self.display_volume.min(ctx.available());
        if qty_is_zero(quantity) {
            return Vec::new();
        }

        let price = match self.quote_price(ctx) {
            Some(price) => price,
            None => return Vec::new(),
        };

        self.slices_sent += 1;
        log::debug!(
            "{}: Iceberg 노출 주문 #{} - {}@{}",
            ctx.algo_id,
            self.slices_sent,
            quantity,
            price
        );
        vec![AlgoAction::Submit(OrderSpec::limit(price, quantity))]
    }

    /// 반대편 호가가 노출 주문 가격을 넘어섰는지 (체결되었어야 할 주문)
    fn is_stale(side: OrderSide, order: &ChildOrder, tick: &TickSnapshot) -> bool {
        match side {
            OrderSide::Buy => tick.ask_price > 0.0 && tick.ask_price < order.price,
            OrderSide::Sell => tick.bid_price > order.price,
        }
    }
}

impl AlgoTemplate for IcebergAlgo {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Iceberg
    }

    fn on_start(&mut self, ctx: &AlgoContext<'_>) -> Result<(), AlgoError> {
        ensure_positive("display_volume", self.display_volume)?;
        if self.display_volume > ctx.target {
            return Err(AlgoError::ConfigError(format!(
                "display_volume ({}) must not exceed target quantity ({})",
                self.display_volume, ctx.target
            )));
        }
        if let Some(price) = ctx.price {
            ensure_positive("price", price)?;
        }
        Ok(())
    }

    fn on_tick(
        &mut self,
        ctx: &AlgoContext<'_>,
        _tick: &TickSnapshot,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        Ok(self.next_slice(ctx))
    }

    fn on_order_update(
        &mut self,
        ctx: &AlgoContext<'_>,
        order: &ChildOrder,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        self.rejects.observe(ctx.algo_id, order)?;

        match order.status {
            // 노출 주문 종료 → 즉시 다음 노출 주문
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired => {
                Ok(self.next_slice(ctx))
            }
            // 거부된 주문은 다음 호가에서 재시도
            _ => Ok(Vec::new()),
        }
    }

    fn on_timer(
        &mut self,
        ctx: &AlgoContext<'_>,
        elapsed: Duration,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        let interval = match self.check_interval {
            Some(interval) => interval,
            None => return Ok(Vec::new()),
        };

        self.elapsed += elapsed;
        if self.elapsed < interval {
            return Ok(Vec::new());
        }
        self.elapsed = Duration::ZERO;

        let tick = match ctx.tick {
            Some(tick) => tick,
            None => return Ok(Vec::new()),
        };

        let actions: Vec<AlgoAction> = ctx
            .working_orders()
            .filter(|order| Self::is_stale(ctx.side, order, tick))
            .map(|order| {
                log::warn!(
                    "{}: 반대편 호가가 주문 가격 {} 을 넘어섬, 노출 주문 {} 강제 취소",
                    ctx.algo_id,
                    order.price,
                    order.order_id
                );
                AlgoAction::Cancel(order.order_id.clone())
            })
            .collect();

        Ok(actions)
    }

    fn variables(&self) -> serde_json::Value {
        json!({
            "display_volume": self.display_volume,
            "slices_sent": self.slices_sent,
            "consecutive_rejects": self.rejects.count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::algo::AlgoId;
    use crate::models::order::OrderId;
    use crate::strategies::test_support::{child_order, context};

    fn iceberg() -> IcebergAlgo {
        IcebergAlgo::from_params(&AlgoParams::new().with("display_volume", 10)).unwrap()
    }

    #[test]
    fn test_first_slice_on_tick_is_idempotent() {
        let algo = AlgoId::from("Iceberg_1");
        let tick = TickSnapshot::new("XYZ", 9.9, 10.1, 10.0, 0);
        let mut algo_impl = iceberg();

        let ctx = context(&algo, 50.0, 0.0, Some(&tick), &[]);
        algo_impl.on_start(&ctx).unwrap();
        let actions = algo_impl.on_tick(&ctx, &tick).unwrap();
        assert_eq!(actions, vec![AlgoAction::Submit(OrderSpec::limit(9.9, 10.0))]);

        // 같은 호가 재수신: 활성 주문이 있으므로 추가 제출 없음
        let live = vec![child_order("A", &algo, 10.0, OrderStatus::Submitted)];
        let ctx = context(&algo, 50.0, 10.0, Some(&tick), &live);
        assert!(algo_impl.on_tick(&ctx, &tick).unwrap().is_empty());
    }

    #[test]
    fn test_requote_after_fill() {
        let algo = AlgoId::from("Iceberg_1");
        let tick = TickSnapshot::new("XYZ", 9.9, 10.1, 10.0, 0);
        let mut algo_impl = iceberg();

        let mut filled = child_order("A", &algo, 10.0, OrderStatus::Filled);
        filled.traded = 10.0;
        let ctx = context(&algo, 50.0, 10.0, Some(&tick), &[]);
        let actions = algo_impl.on_order_update(&ctx, &filled).unwrap();
        assert_eq!(actions.len(), 1);

        // 마지막 조각: 가용 수량 0 이면 제출 없음
        let ctx = context(&algo, 50.0, 50.0, Some(&tick), &[]);
        assert!(algo_impl.on_order_update(&ctx, &filled).unwrap().is_empty());
    }

    #[test]
    fn test_display_volume_above_target_rejected() {
        let algo = AlgoId::from("Iceberg_1");
        let ctx = context(&algo, 5.0, 0.0, None, &[]);
        let mut algo_impl = iceberg();
        assert!(matches!(algo_impl.on_start(&ctx), Err(AlgoError::ConfigError(_))));
    }

    #[test]
    fn test_stale_order_cancelled_once() {
        let algo = AlgoId::from("Iceberg_1");
        let params = AlgoParams::new().with("display_volume", 10).with("interval", 5);
        let mut algo_impl = IcebergAlgo::from_params(&params).unwrap();
        let tick = TickSnapshot::new("XYZ", 9.7, 9.8, 9.75, 0);

        let live = vec![child_order("A", &algo, 10.0, OrderStatus::Submitted)];
        let ctx = context(&algo, 50.0, 10.0, Some(&tick), &live);
        let actions = algo_impl.on_timer(&ctx, Duration::from_secs(5)).unwrap();
        assert_eq!(actions, vec![AlgoAction::Cancel(OrderId::from("A"))]);

        let mut requested = child_order("A", &algo, 10.0, OrderStatus::Submitted);
        requested.cancel_requested = true;
        let live = vec![requested];
        let ctx = context(&algo, 50.0, 10.0, Some(&tick), &live);
        assert!(algo_impl.on_timer(&ctx, Duration::from_secs(5)).unwrap().is_empty());
    }
}
