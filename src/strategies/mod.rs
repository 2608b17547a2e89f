//! 알고리즘 템플릿
//!
//! 각 실행 전략(TWAP, Iceberg, Sniper, BestLimit)은 [`AlgoTemplate`] 을 구현한다.
//! 템플릿은 게이트웨이를 직접 호출하지 않고 [`AlgoAction`] 목록을 반환하며,
//! 실제 제출/취소는 엔진이 수행한다.

pub mod best_limit;
pub mod iceberg;
pub mod sniper;
pub mod twap;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AlgoError;
use crate::models::algo::{AlgoId, AlgoParams};
use crate::models::market_data::TickSnapshot;
use crate::models::order::{ChildOrder, OrderId, OrderSide, OrderSpec, OrderStatus};
use crate::models::trade::Fill;
use crate::utils::math::QTY_EPSILON;

/// 연속 거부 허용 횟수. 초과 시 템플릿이 GatewayRejected 로 중단
pub const MAX_CONSECUTIVE_REJECTS: u32 = 3;

/// 템플릿 결정 결과
#[derive(Debug, Clone, PartialEq)]
pub enum AlgoAction {
    Submit(OrderSpec),
    Cancel(OrderId),
}

/// 템플릿 호출 시 전달되는 인스턴스 읽기 전용 뷰
#[derive(Debug)]
pub struct AlgoContext<'a> {
    pub algo_id: &'a AlgoId,
    pub instrument: &'a str,
    pub side: OrderSide,
    /// 부모 주문 지정가 (없으면 시장 호가 기준)
    pub price: Option<f64>,
    pub target: f64,
    pub traded: f64,
    /// 목표 수량 중 이미 점유된 수량 (체결 + 활성 주문)
    pub committed: f64,
    pub tick: Option<&'a TickSnapshot>,
    pub active_orders: &'a [ChildOrder],
}

impl<'a> AlgoContext<'a> {
    /// 새 주문에 사용할 수 있는 수량
    pub fn available(&self) -> f64 {
        let available = self.target - self.committed;
        if available <= QTY_EPSILON {
            0.0
        } else {
            available
        }
    }

    /// 아직 체결되지 않은 수량
    pub fn remaining(&self) -> f64 {
        (self.target - self.traded).max(0.0)
    }

    pub fn has_active_orders(&self) -> bool {
        !self.active_orders.is_empty()
    }

    /// 취소 요청되지 않은 활성 주문
    pub fn working_orders(&self) -> impl Iterator<Item = &ChildOrder> {
        self.active_orders.iter().filter(|o| !o.cancel_requested)
    }

    /// 모든 활성 주문 취소 (이미 취소 요청된 주문 제외)
    pub fn cancel_all(&self) -> Vec<AlgoAction> {
        self.working_orders()
            .map(|o| AlgoAction::Cancel(o.order_id.clone()))
            .collect()
    }

    /// 지정가를 넘지 않도록 가격 제한 (매수: 이하, 매도: 이상)
    pub fn cap_price(&self, price: f64) -> f64 {
        match (self.price, self.side) {
            (Some(limit), OrderSide::Buy) => price.min(limit),
            (Some(limit), OrderSide::Sell) => price.max(limit),
            (None, _) => price,
        }
    }
}

/// 알고리즘 템플릿 인터페이스
pub trait AlgoTemplate: Send + Sync {
    /// 템플릿 종류
    fn kind(&self) -> TemplateKind;

    /// 시작 시 파라미터 검증
    fn on_start(&mut self, ctx: &AlgoContext<'_>) -> Result<(), AlgoError>;

    /// 호가 수신
    fn on_tick(
        &mut self,
        _ctx: &AlgoContext<'_>,
        _tick: &TickSnapshot,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        Ok(Vec::new())
    }

    /// 하위 주문 상태 변경
    fn on_order_update(
        &mut self,
        _ctx: &AlgoContext<'_>,
        _order: &ChildOrder,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        Ok(Vec::new())
    }

    /// 체결 반영 후 호출
    fn on_fill(
        &mut self,
        _ctx: &AlgoContext<'_>,
        _fill: &Fill,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        Ok(Vec::new())
    }

    /// 주기 타이머
    fn on_timer(
        &mut self,
        _ctx: &AlgoContext<'_>,
        _elapsed: Duration,
    ) -> Result<Vec<AlgoAction>, AlgoError> {
        Ok(Vec::new())
    }

    /// 중지 시 모든 활성 하위 주문 취소
    fn on_stop(&mut self, ctx: &AlgoContext<'_>) -> Vec<AlgoAction> {
        ctx.cancel_all()
    }

    /// 상태 조회용 내부 변수
    fn variables(&self) -> serde_json::Value;
}

/// 템플릿 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TemplateKind {
    Twap,
    Iceberg,
    Sniper,
    BestLimit,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::Twap,
        TemplateKind::Iceberg,
        TemplateKind::Sniper,
        TemplateKind::BestLimit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::Twap => "TWAP",
            TemplateKind::Iceberg => "Iceberg",
            TemplateKind::Sniper => "Sniper",
            TemplateKind::BestLimit => "BestLimit",
        }
    }

    /// 파라미터로 템플릿 생성 (타입 오류는 ConfigError)
    pub fn build(&self, params: &AlgoParams) -> Result<Box<dyn AlgoTemplate>, AlgoError> {
        let template: Box<dyn AlgoTemplate> = match self {
            TemplateKind::Twap => Box::new(twap::TwapAlgo::from_params(params)?),
            TemplateKind::Iceberg => Box::new(iceberg::IcebergAlgo::from_params(params)?),
            TemplateKind::Sniper => Box::new(sniper::SniperAlgo::from_params(params)?),
            TemplateKind::BestLimit => Box::new(best_limit::BestLimitAlgo::from_params(params)?),
        };
        Ok(template)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TemplateKind {
    type Err = AlgoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let normalized = normalized.trim_end_matches("algo");

        match normalized {
            "twap" => Ok(TemplateKind::Twap),
            "iceberg" => Ok(TemplateKind::Iceberg),
            "sniper" => Ok(TemplateKind::Sniper),
            "bestlimit" => Ok(TemplateKind::BestLimit),
            _ => Err(AlgoError::UnknownTemplate(s.to_string())),
        }
    }
}

impl TryFrom<String> for TemplateKind {
    type Error = AlgoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TemplateKind> for String {
    fn from(kind: TemplateKind) -> Self {
        kind.name().to_string()
    }
}

/// 연속 거부 횟수 추적
///
/// 거부가 아닌 상태 변경이 들어오면 초기화된다.
#[derive(Debug, Default, Clone)]
pub struct RejectCounter {
    consecutive: u32,
}

impl RejectCounter {
    pub fn observe(&mut self, algo_id: &AlgoId, order: &ChildOrder) -> Result<(), AlgoError> {
        match order.status {
            OrderStatus::Rejected => {
                self.consecutive += 1;
                log::warn!(
                    "{}: 주문 거부 {} ({}/{})",
                    algo_id,
                    order.order_id,
                    self.consecutive,
                    MAX_CONSECUTIVE_REJECTS
                );
                if self.consecutive >= MAX_CONSECUTIVE_REJECTS {
                    return Err(AlgoError::GatewayRejected(format!(
                        "{} consecutive rejections, last order {}",
                        self.consecutive, order.order_id
                    )));
                }
            }
            OrderStatus::Submitted | OrderStatus::PartiallyFilled | OrderStatus::Filled => {
                self.consecutive = 0;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }
}

/// 값이 양수인지 검증
pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<(), AlgoError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(AlgoError::ConfigError(format!(
            "{} must be greater than 0, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::order::{OrderRequest, OrderType};

    pub fn child_order(id: &str, algo: &AlgoId, quantity: f64, status: OrderStatus) -> ChildOrder {
        let request = OrderRequest {
            order_id: OrderId::from(id),
            algo_id: algo.clone(),
            instrument: "XYZ".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: 10.0,
            quantity,
            reference: "test".to_string(),
            created_at: 0,
        };
        let mut order = ChildOrder::from_request(&request);
        order.status = status;
        order
    }

    pub fn context<'a>(
        algo_id: &'a AlgoId,
        target: f64,
        committed: f64,
        tick: Option<&'a TickSnapshot>,
        active_orders: &'a [ChildOrder],
    ) -> AlgoContext<'a> {
        AlgoContext {
            algo_id,
            instrument: "XYZ",
            side: OrderSide::Buy,
            price: None,
            target,
            traded: 0.0,
            committed,
            tick,
            active_orders,
        }
    }
}
