//! BestLimit 전략
//!
//! 주문 방향 최우선 호가에 지정가 주문 하나를 유지한다.
//! 최우선 호가가 허용 오차 이상 움직이면 한 번 취소하고 다음 호가에서 다시 낸다.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::error::AlgoError;
use crate::models::algo::AlgoParams;
use crate::models::market_data::TickSnapshot;
use crate::models::order::{ChildOrder, OrderSpec};
use crate::strategies::{ensure_positive, AlgoAction, AlgoContext, AlgoTemplate, RejectCounter, TemplateKind};
use crate::utils::math::{qty_is_zero, round_quantity};

/// 주문 수량 범위 (랜덤 수량용)
#[derive(Debug, Clone, Copy, PartialEq)]
struct VolumeRange {
    min: f64,
    max: f64,
    step: f64,
}

/// BestLimit 실행 알고리즘
pub struct BestLimitAlgo {
    /// 최우선 호가 이동 허용 오차
    tolerance: f64,
    volume_range: Option<VolumeRange>,
    /// 현재 주문 가격
    order_price: Option<f64>,
    quotes_sent: u64,
    rng: StdRng,
    rejects: RejectCounter,
}

impl BestLimitAlgo {
    pub fn from_params(params: &AlgoParams) -> Result<Self, AlgoError> {
        let tolerance = params.require_f64("tolerance")?;
        let min_volume = params.get_f64("min_volume")?.unwrap_or(0.0);
        let max_volume = params.get_f64("max_volume")?.unwrap_or(0.0);
        let step = params.get_f64("volume_step")?.unwrap_or(0.0);

        // 0/0 은 랜덤 수량 미사용
        let volume_range = if min_volume == 0.0 && max_volume == 0.0 {
            None
        } else {
            Some(VolumeRange {
                min: min_volume,
                max: max_volume,
                step,
            })
        };

        Ok(BestLimitAlgo {
            tolerance,
            volume_range,
            order_price: None,
            quotes_sent: 0,
            rng: StdRng::from_entropy(),
            rejects: RejectCounter::default(),
        })
    }

    /// 랜덤 수량 재현용 시드 고정
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn quote_quantity(&mut self, available: f64) -> f64 {
        let quantity = match self.volume_range {
            Some(range) => {
                let raw = if range.max > range.min {
                    self.rng.gen_range(range.min..=range.max)
                } else {
                    range.min
                };
                round_quantity(raw, range.step).max(range.min)
            }
            None => available,
        };
        quantity.min(available)
    }

    fn quote(&mut self, ctx: &AlgoContext<'_>, tick: &TickSnapshot) -> Vec<AlgoAction> {
        let best = tick.own_price(ctx.side);
        if best <= 0.0 {
            return Vec::new();
        }

        let available = ctx.available();
        if qty_is_zero(available) {
            return Vec::new();
        }

        let price = ctx.cap_price(best);
        let quantity = self.quote_quantity(available);
        self.order_price = Some(price);
        self.quotes_sent += 1;

        log::debug!(
            "{}: BestLimit 호가 #{} - {}@{}",
            ctx.algo_id,
            self.quotes_sent,
            quantity,
            price
        );
        vec![AlgoAction::Submit(OrderSpec::limit(price, quantity))]
    }
}

impl AlgoTemplate for BestLimitAlgo {
    fn kind(&self) -> TemplateKind {
        TemplateKind::BestLimit
    }

    fn on_start(&mut self, ctx: &AlgoContext<'_>) -> Result<(), AlgoError> {
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(AlgoError::ConfigError(format!(
                "tolerance must not be negative, got {}",
                self.tolerance
            )));
        }
        ensure_positive("quantity", ctx.target)?;

        if let Some(range) = self.volume_range {
            ensure_positive("min_volume", range.min)?;
            if range.max < range.min {
                return Err(AlgoError::ConfigError(format!(
                    "max_volume ({}) must not be less than min_volume ({})",
                    range.max, range.min
                )));
            }
            if range.step < 0.0 {
                return Err(AlgoError::ConfigError(format!(
                    "volume_step must not be negative, got {}",
                    range.step
                )));
            }
        }
        Ok(())
    }

    fn on_tick(
        &mut self,
        ctx: &AlgoContext<'_>,
        tick: &TickSnapshot,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        if !ctx.has_active_orders() {
            return Ok(self.quote(ctx, tick));
        }

        // 취소 요청 중이면 종료 통보까지 대기
        if ctx.working_orders().next().is_none() {
            return Ok(Vec::new());
        }

        // 지정가에 막힌 호가는 지정가 기준으로 비교
        let best = ctx.cap_price(tick.own_price(ctx.side));
        match self.order_price {
            Some(price) if (best - price).abs() > self.tolerance => {
                log::debug!(
                    "{}: 최우선 호가 이동 {} → {}, 재호가를 위해 취소",
                    ctx.algo_id,
                    price,
                    best
                );
                Ok(ctx.cancel_all())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn on_order_update(
        &mut self,
        ctx: &AlgoContext<'_>,
        order: &ChildOrder,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        self.rejects.observe(ctx.algo_id, order)?;
        if order.status.is_terminal() && !ctx.has_active_orders() {
            self.order_price = None;
        }
        Ok(Vec::new())
    }

    fn variables(&self) -> serde_json::Value {
        json!({
            "order_price": self.order_price,
            "tolerance": self.tolerance,
            "quotes_sent": self.quotes_sent,
        })
    }
}
