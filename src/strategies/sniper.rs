//! Sniper 전략
//!
//! 반대편 호가가 목표 가격(허용 오차 포함)에 도달하면 남은 수량 전체를 한 번에 제출

use serde_json::json;

use crate::error::AlgoError;
use crate::models::algo::AlgoParams;
use crate::models::market_data::TickSnapshot;
use crate::models::order::{ChildOrder, OrderSide, OrderSpec};
use crate::strategies::{ensure_positive, AlgoAction, AlgoContext, AlgoTemplate, RejectCounter, TemplateKind};
use crate::utils::math::qty_is_zero;

/// Sniper 실행 알고리즘
pub struct SniperAlgo {
    /// 목표 가격 (없으면 부모 지정가)
    target_price: Option<f64>,
    /// 목표 가격 허용 오차
    tolerance: f64,
    /// 주문 수량을 반대편 최우선 호가 잔량으로 제한
    cap_volume: bool,
    /// 트리거 횟수
    triggers: u64,
    rejects: RejectCounter,
}

impl SniperAlgo {
    pub fn from_params(params: &AlgoParams) -> Result<Self, AlgoError> {
        let target_price = params.get_f64("target_price")?;
        let tolerance = params.require_f64("tolerance")?;
        let cap_volume = params.get_f64("cap_volume")?.map_or(false, |flag| flag != 0.0);

        Ok(SniperAlgo {
            target_price,
            tolerance,
            cap_volume,
            triggers: 0,
            rejects: RejectCounter::default(),
        })
    }

    fn target(&self, ctx: &AlgoContext<'_>) -> Option<f64> {
        self.target_price.or(ctx.price)
    }

    /// 반대편 호가가 목표 범위 안에 있는지
    fn in_range(&self, side: OrderSide, target: f64, tick: &TickSnapshot) -> bool {
        match side {
            OrderSide::Buy => tick.ask_price > 0.0 && tick.ask_price <= target + self.tolerance,
            OrderSide::Sell => tick.bid_price > 0.0 && tick.bid_price >= target - self.tolerance,
        }
    }
}

impl AlgoTemplate for SniperAlgo {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Sniper
    }

    fn on_start(&mut self, ctx: &AlgoContext<'_>) -> Result<(), AlgoError> {
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(AlgoError::ConfigError(format!(
                "tolerance must not be negative, got {}",
                self.tolerance
            )));
        }
        match self.target(ctx) {
            Some(target) => ensure_positive("target_price", target),
            None => Err(AlgoError::ConfigError(
                "Sniper requires target_price or a limit price".to_string(),
            )),
        }
    }

    fn on_tick(
        &mut self,
        ctx: &AlgoContext<'_>,
        tick: &TickSnapshot,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        let target = match self.target(ctx) {
            Some(target) => target,
            None => return Ok(Vec::new()),
        };

        // 주문이 살아 있는 동안 재제출하지 않음. 범위를 벗어나면 한 번만 취소
        if ctx.has_active_orders() {
            if self.in_range(ctx.side, target, tick) {
                return Ok(Vec::new());
            }
            return Ok(ctx.cancel_all());
        }

        if !self.in_range(ctx.side, target, tick) {
            return Ok(Vec::new());
        }

        let mut quantity = ctx.available();
        if self.cap_volume {
            quantity = quantity.min(tick.opposite_volume(ctx.side));
        }
        if qty_is_zero(quantity) {
            return Ok(Vec::new());
        }

        self.triggers += 1;
        let price = tick.opposite_price(ctx.side);
        log::info!(
            "{}: 목표 가격 도달 ({} ± {}), {}@{} 제출",
            ctx.algo_id,
            target,
            self.tolerance,
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
            "target_price": self.target_price,
            "tolerance": self.tolerance,
            "cap_volume": self.cap_volume,
            "triggers": self.triggers,
        })
    }
}
