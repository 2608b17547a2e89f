//! TWAP 전략
//!
//! 목표 수량을 `slice_count` 개로 균등 분할하여 `interval` 초마다 한 조각씩 제출

use serde_json::json;
use std::time::Duration;

use crate::error::AlgoError;
use crate::models::algo::AlgoParams;
use crate::models::market_data::TickSnapshot;
use crate::models::order::{ChildOrder, OrderSide, OrderSpec};
use crate::strategies::{ensure_positive, AlgoAction, AlgoContext, AlgoTemplate, RejectCounter, TemplateKind};
use crate::utils::math::qty_is_zero;

/// TWAP 실행 알고리즘
pub struct TwapAlgo {
    /// 분할 간격
    interval: Duration,
    /// 분할 수
    slice_count: u64,
    /// 호가 대비 가격 조정 (공격적인 방향으로 가산)
    price_offset: f64,
    /// 기본 분할 수량 (start 시 계산)
    slice_quantity: f64,
    /// 마지막 분할 이후 누적 실행 시간
    elapsed: Duration,
    /// 제출한 분할 수
    slices_sent: u64,
    rejects: RejectCounter,
}

impl TwapAlgo {
    pub fn from_params(params: &AlgoParams) -> Result<Self, AlgoError> {
        let interval = params.require_f64("interval")?;
        let slice_count = params.require_u64("slice_count")?;
        let price_offset = params.get_f64("price_offset")?.unwrap_or(0.0);

        if !(interval > 0.0 && interval.is_finite()) {
            return Err(AlgoError::ConfigError(format!(
                "interval must be greater than 0, got {}",
                interval
            )));
        }

        Ok(TwapAlgo {
            interval: Duration::from_secs_f64(interval),
            slice_count,
            price_offset,
            slice_quantity: 0.0,
            elapsed: Duration::ZERO,
            slices_sent: 0,
            rejects: RejectCounter::default(),
        })
    }

    fn slice_price(&self, ctx: &AlgoContext<'_>, tick: &TickSnapshot) -> f64 {
        let best = tick.own_price(ctx.side);
        let price = match ctx.side {
            OrderSide::Buy => best + self.price_offset,
            OrderSide::Sell => best - self.price_offset,
        };
        ctx.cap_price(price)
    }

    /// 다음 분할 수량. 마지막 분할은 남은 가용 수량 전체
    fn next_slice_quantity(&self, ctx: &AlgoContext<'_>) -> f64 {
        let available = ctx.available();
        if self.slices_sent + 1 >= self.slice_count {
            available
        } else {
            self.slice_quantity.min(available)
        }
    }
}

impl AlgoTemplate for TwapAlgo {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Twap
    }

    fn on_start(&mut self, ctx: &AlgoContext<'_>) -> Result<(), AlgoError> {
        if self.slice_count == 0 {
            return Err(AlgoError::ConfigError(
                "slice_count must be greater than 0".to_string(),
            ));
        }
        ensure_positive("quantity", ctx.target)?;

        self.slice_quantity = ctx.target / self.slice_count as f64;
        self.elapsed = Duration::ZERO;
        self.slices_sent = 0;
        Ok(())
    }

    fn on_timer(
        &mut self,
        ctx: &AlgoContext<'_>,
        elapsed: Duration,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        if self.slices_sent >= self.slice_count {
            return Ok(Vec::new());
        }

        self.elapsed += elapsed;
        if self.elapsed < self.interval {
            return Ok(Vec::new());
        }

        // 호가가 없으면 다음 타이머까지 대기 (경과 시간 유지)
        let tick = match ctx.tick {
            Some(tick) if tick.has_quotes() => tick,
            _ => return Ok(Vec::new()),
        };

        self.elapsed -= self.interval;

        let quantity = self.next_slice_quantity(ctx);
        self.slices_sent += 1;

        if qty_is_zero(quantity) {
            log::debug!("{}: 가용 수량 없음, 분할 {} 건너뜀", ctx.algo_id, self.slices_sent);
            return Ok(Vec::new());
        }

        let price = self.slice_price(ctx, tick);
        log::debug!(
            "{}: TWAP 분할 {}/{} - {}@{}",
            ctx.algo_id,
            self.slices_sent,
            self.slice_count,
            quantity,
            price
        );

        Ok(vec![AlgoAction::Submit(OrderSpec::limit(price, quantity))])
    }

    fn on_order_update(
        &mut self,
        ctx: &AlgoContext<'_>,
        order: &ChildOrder,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        self.rejects.observe(ctx.algo_id, order)?;
        Ok(Vec::new())
    }

    fn variables(&self) -> serde_json::Value {
        json!({
            "slice_quantity": self.slice_quantity,
            "slices_sent": self.slices_sent,
            "slice_count": self.slice_count,
            "elapsed_secs": self.elapsed.as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::algo::AlgoId;
    use crate::strategies::test_support::context;

    fn params() -> AlgoParams {
        AlgoParams::new().with("interval", 60).with("slice_count", 5)
    }

    #[test]
    fn test_twap_slices_on_interval() {
        let algo = AlgoId::from("TWAP_1");
        let tick = TickSnapshot::new("XYZ", 10.0, 10.1, 10.05, 0);
        let mut twap = TwapAlgo::from_params(&params()).unwrap();

        let ctx = context(&algo, 100.0, 0.0, Some(&tick), &[]);
        twap.on_start(&ctx).unwrap();

        // 간격 이전에는 주문 없음
        let actions = twap.on_timer(&ctx, Duration::from_secs(59)).unwrap();
        assert!(actions.is_empty());

        let actions = twap.on_timer(&ctx, Duration::from_secs(1)).unwrap();
        assert_eq!(actions, vec![AlgoAction::Submit(OrderSpec::limit(10.0, 20.0))]);

        // 같은 간격 안에서는 다시 제출하지 않음
        let ctx = context(&algo, 100.0, 20.0, Some(&tick), &[]);
        let actions = twap.on_timer(&ctx, Duration::from_secs(30)).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_twap_waits_for_tick() {
        let algo = AlgoId::from("TWAP_1");
        let mut twap = TwapAlgo::from_params(&params()).unwrap();
        let ctx = context(&algo, 100.0, 0.0, None, &[]);
        twap.on_start(&ctx).unwrap();

        assert!(twap.on_timer(&ctx, Duration::from_secs(60)).unwrap().is_empty());

        let tick = TickSnapshot::new("XYZ", 10.0, 10.1, 10.05, 0);
        let ctx = context(&algo, 100.0, 0.0, Some(&tick), &[]);
        let actions = twap.on_timer(&ctx, Duration::from_secs(1)).unwrap();
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_twap_last_slice_takes_remainder() {
        let algo = AlgoId::from("TWAP_1");
        let tick = TickSnapshot::new("XYZ", 10.0, 10.1, 10.05, 0);
        let params = AlgoParams::new()
            .with("interval", 1)
            .with("slice_count", 3)
            .with("price_offset", 0.02);
        let mut twap = TwapAlgo::from_params(&params).unwrap();
        let ctx = context(&algo, 10.0, 0.0, Some(&tick), &[]);
        twap.on_start(&ctx).unwrap();

        twap.on_timer(&ctx, Duration::from_secs(1)).unwrap();
        let ctx = context(&algo, 10.0, 3.0, Some(&tick), &[]);
        twap.on_timer(&ctx, Duration::from_secs(1)).unwrap();

        let ctx = context(&algo, 10.0, 6.0, Some(&tick), &[]);
        let actions = twap.on_timer(&ctx, Duration::from_secs(1)).unwrap();
        match &actions[0] {
            AlgoAction::Submit(spec) => {
                assert!((spec.quantity - 4.0).abs() < 1e-9);
                assert!((spec.price - 10.02).abs() < 1e-9);
            }
            other => panic!("unexpected action {:?}", other),
        }

        // 모든 분할 제출 후에는 더 이상 주문 없음
        assert!(twap.on_timer(&ctx, Duration::from_secs(5)).unwrap().is_empty());
    }

    #[test]
    fn test_twap_rejects_invalid_params() {
        let algo = AlgoId::from("TWAP_1");
        let ctx = context(&algo, 100.0, 0.0, None, &[]);

        assert!(TwapAlgo::from_params(&AlgoParams::new().with("slice_count", 5)).is_err());
        assert!(TwapAlgo::from_params(&AlgoParams::new().with("interval", 0).with("slice_count", 5)).is_err());

        let mut twap =
            TwapAlgo::from_params(&AlgoParams::new().with("interval", 60).with("slice_count", 0)).unwrap();
        assert!(matches!(twap.on_start(&ctx), Err(AlgoError::ConfigError(_))));
    }
}
