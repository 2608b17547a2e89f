use std::collections::{HashMap, HashSet};

use crate::error::AlgoError;
use crate::models::algo::AlgoId;
use crate::models::order::{ChildOrder, OrderId, OrderStatus, OrderUpdate};
use crate::models::trade::Fill;
use crate::utils::math::{qty_reached, weighted_average, QTY_EPSILON};

/// 알고리즘별 누적 체결 현황
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlgoPosition {
    pub target: f64,
    pub traded: f64,
    /// 가중 평균 체결가
    pub traded_price: f64,
    pub fill_count: usize,
}

/// 체결 반영 결과
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub algo_id: AlgoId,
    pub order: ChildOrder,
    pub traded: f64,
    pub traded_price: f64,
}

/// 목표 수량 대비 체결 현황
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub target: f64,
    pub traded: f64,
    pub traded_price: f64,
    pub finished: bool,
}

/// 하위 주문 원장
///
/// 하위 주문을 소유 알고리즘에 매핑하고 체결을 누적 체결 수량으로 합산한다.
/// 로컬 ID 를 먼저 조회하고, 없으면 거래소 ID 인덱스로 조회한다.
#[derive(Debug, Default)]
pub struct OrderLedger {
    orders: HashMap<OrderId, ChildOrder>,
    exchange_index: HashMap<OrderId, OrderId>, // exchange id -> local id
    algo_orders: HashMap<AlgoId, Vec<OrderId>>,
    positions: HashMap<AlgoId, AlgoPosition>,
    seen_fills: HashSet<String>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 알고리즘 목표 수량 등록
    pub fn register_algo(&mut self, algo_id: &AlgoId, target: f64) {
        self.positions
            .entry(algo_id.clone())
            .and_modify(|p| p.target = target)
            .or_insert_with(|| AlgoPosition {
                target,
                ..AlgoPosition::default()
            });
        self.algo_orders.entry(algo_id.clone()).or_default();
    }

    pub fn is_registered(&self, algo_id: &AlgoId) -> bool {
        self.positions.contains_key(algo_id)
    }

    /// 알고리즘과 그 하위 주문 기록 제거 (시작 실패 시)
    pub fn remove_algo(&mut self, algo_id: &AlgoId) {
        self.positions.remove(algo_id);
        if let Some(ids) = self.algo_orders.remove(algo_id) {
            for id in ids {
                if let Some(order) = self.orders.remove(&id) {
                    if let Some(exchange_id) = order.exchange_order_id {
                        self.exchange_index.remove(&exchange_id);
                    }
                }
            }
        }
    }

    /// 게이트웨이 호출 전 하위 주문 기록
    pub fn record_submission(&mut self, order: ChildOrder) -> Result<(), AlgoError> {
        if !self.is_registered(&order.algo_id) {
            return Err(AlgoError::LedgerInconsistency(format!(
                "order {} belongs to unregistered algorithm {}",
                order.order_id, order.algo_id
            )));
        }
        if self.orders.contains_key(&order.order_id) {
            return Err(AlgoError::LedgerInconsistency(format!(
                "duplicate order id {}",
                order.order_id
            )));
        }

        self.algo_orders
            .entry(order.algo_id.clone())
            .or_default()
            .push(order.order_id.clone());
        self.orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    /// 게이트웨이가 돌려준 거래소 주문 ID 연결
    pub fn attach_exchange_id(
        &mut self,
        order_id: &OrderId,
        exchange_order_id: OrderId,
    ) -> Result<(), AlgoError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| AlgoError::OrderNotFound(order_id.clone()))?;

        order.exchange_order_id = Some(exchange_order_id.clone());
        if order.status == OrderStatus::Submitting {
            order.status = OrderStatus::Submitted;
        }
        self.exchange_index.insert(exchange_order_id, order_id.clone());
        Ok(())
    }

    /// 로컬 ID 또는 거래소 ID 로 로컬 ID 조회
    pub fn resolve(&self, order_id: &OrderId) -> Option<&OrderId> {
        if let Some((local, _)) = self.orders.get_key_value(order_id) {
            return Some(local);
        }
        self.exchange_index.get(order_id)
    }

    pub fn order(&self, order_id: &OrderId) -> Option<&ChildOrder> {
        let local = self.resolve(order_id)?;
        self.orders.get(local)
    }

    /// 주문 상태 변경 반영
    ///
    /// 변경이 있으면 갱신된 주문을, 중복/역행 이벤트면 `None` 을 반환한다.
    /// 종료된 주문은 다시 활성 상태로 돌아가지 않는다.
    pub fn record_update(&mut self, update: &OrderUpdate) -> Result<Option<ChildOrder>, AlgoError> {
        let local = self
            .resolve(&update.order_id)
            .cloned()
            .ok_or_else(|| {
                AlgoError::LedgerInconsistency(format!(
                    "update for unknown order {}",
                    update.order_id
                ))
            })?;
        let order = match self.orders.get_mut(&local) {
            Some(order) => order,
            None => return Err(AlgoError::OrderNotFound(local)),
        };

        if order.status.is_terminal() {
            log::debug!(
                "{}: 종료된 주문 {} 에 대한 상태 {} 무시",
                order.algo_id,
                order.order_id,
                update.status
            );
            return Ok(None);
        }

        if !(update.traded >= 0.0 && update.traded <= order.quantity + QTY_EPSILON) {
            return Err(AlgoError::LedgerInconsistency(format!(
                "update for order {} reports traded {} of {}",
                order.order_id, update.traded, order.quantity
            )));
        }

        let mut changed = false;

        if update.traded > order.traded + QTY_EPSILON {
            order.traded = update.traded;
            changed = true;
        }

        let status = match (order.status, update.status) {
            (_, OrderStatus::Submitting) => order.status,
            (OrderStatus::PartiallyFilled, OrderStatus::Submitted) => order.status,
            (_, next) => next,
        };
        if status != order.status {
            order.status = status;
            changed = true;
        }

        Ok(if changed { Some(order.clone()) } else { None })
    }

    /// 취소 요청 기록. 이미 요청했거나 종료된 주문이면 false
    pub fn mark_cancel_requested(&mut self, order_id: &OrderId) -> bool {
        let local = match self.resolve(order_id).cloned() {
            Some(local) => local,
            None => return false,
        };
        match self.orders.get_mut(&local) {
            Some(order) if order.is_active() && !order.cancel_requested => {
                order.cancel_requested = true;
                true
            }
            _ => false,
        }
    }

    /// 체결 반영
    ///
    /// 이미 반영된 체결 ID 는 `Ok(None)`. 알 수 없는 주문, 하위 주문 초과 체결,
    /// 목표 수량 초과 체결은 `LedgerInconsistency` 로 거부되며 상태는 바뀌지 않는다.
    pub fn record_fill(&mut self, fill: &Fill) -> Result<Option<FillOutcome>, AlgoError> {
        if self.seen_fills.contains(&fill.fill_id) {
            log::debug!("중복 체결 {} 무시", fill.fill_id);
            return Ok(None);
        }

        if !(fill.quantity > 0.0 && fill.quantity.is_finite()) {
            return Err(AlgoError::LedgerInconsistency(format!(
                "fill {} has invalid quantity {}",
                fill.fill_id, fill.quantity
            )));
        }

        let local = self.resolve(&fill.order_id).cloned().ok_or_else(|| {
            AlgoError::LedgerInconsistency(format!(
                "fill {} for unknown order {}",
                fill.fill_id, fill.order_id
            ))
        })?;
        let order = self
            .orders
            .get_mut(&local)
            .ok_or_else(|| AlgoError::OrderNotFound(local.clone()))?;

        if order.filled + fill.quantity > order.quantity + QTY_EPSILON {
            return Err(AlgoError::LedgerInconsistency(format!(
                "fill {} over-fills order {} ({} + {} > {})",
                fill.fill_id, order.order_id, order.filled, fill.quantity, order.quantity
            )));
        }

        let position = self.positions.get_mut(&order.algo_id).ok_or_else(|| {
            AlgoError::LedgerInconsistency(format!(
                "order {} belongs to unregistered algorithm {}",
                order.order_id, order.algo_id
            ))
        })?;

        if position.traded + fill.quantity > position.target + QTY_EPSILON {
            return Err(AlgoError::LedgerInconsistency(format!(
                "fill {} pushes {} above target ({} + {} > {})",
                fill.fill_id, order.algo_id, position.traded, fill.quantity, position.target
            )));
        }

        self.seen_fills.insert(fill.fill_id.clone());

        order.filled += fill.quantity;
        if order.filled > order.traded {
            order.traded = order.filled;
        }

        position.traded_price =
            weighted_average(position.traded_price, position.traded, fill.price, fill.quantity);
        position.traded += fill.quantity;
        position.fill_count += 1;

        Ok(Some(FillOutcome {
            algo_id: order.algo_id.clone(),
            order: order.clone(),
            traded: position.traded,
            traded_price: position.traded_price,
        }))
    }

    /// 목표 수량 도달 여부 확인
    pub fn reconcile(&self, algo_id: &AlgoId) -> Option<Reconciliation> {
        self.positions.get(algo_id).map(|p| Reconciliation {
            target: p.target,
            traded: p.traded,
            traded_price: p.traded_price,
            finished: p.target > 0.0 && qty_reached(p.traded, p.target),
        })
    }

    pub fn position(&self, algo_id: &AlgoId) -> Option<&AlgoPosition> {
        self.positions.get(algo_id)
    }

    /// 목표 수량 중 점유된 수량 (체결 + 활성 주문 잔량)
    pub fn committed(&self, algo_id: &AlgoId) -> f64 {
        self.orders_of(algo_id).map(|o| o.committed()).sum()
    }

    /// 활성 하위 주문 목록 (생성 순)
    pub fn active_orders(&self, algo_id: &AlgoId) -> Vec<ChildOrder> {
        self.orders_of(algo_id)
            .filter(|o| o.is_active())
            .cloned()
            .collect()
    }

    /// 알고리즘의 모든 하위 주문 (생성 순)
    pub fn orders(&self, algo_id: &AlgoId) -> Vec<ChildOrder> {
        self.orders_of(algo_id).cloned().collect()
    }

    fn orders_of<'a>(&'a self, algo_id: &AlgoId) -> impl Iterator<Item = &'a ChildOrder> + 'a {
        self.algo_orders
            .get(algo_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.orders.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderRequest, OrderSide, OrderType};

    fn submission(algo: &AlgoId, id: &str, quantity: f64) -> ChildOrder {
        ChildOrder::from_request(&OrderRequest {
            order_id: OrderId::from(id),
            algo_id: algo.clone(),
            instrument: "XYZ".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: 10.0,
            quantity,
            reference: algo.to_string(),
            created_at: 0,
        })
    }

    fn ledger_with_order(target: f64, quantity: f64) -> (OrderLedger, AlgoId) {
        let algo = AlgoId::from("TWAP_1");
        let mut ledger = OrderLedger::new();
        ledger.register_algo(&algo, target);
        ledger.record_submission(submission(&algo, "L1", quantity)).unwrap();
        ledger.attach_exchange_id(&OrderId::from("L1"), OrderId::from("X1")).unwrap();
        (ledger, algo)
    }

    #[test]
    fn test_weighted_average_fills() {
        let (mut ledger, algo) = ledger_with_order(100.0, 20.0);

        ledger
            .record_fill(&Fill::new("F1", OrderId::from("X1"), 10.0, 10.0, 0))
            .unwrap();
        let outcome = ledger
            .record_fill(&Fill::new("F2", OrderId::from("L1"), 11.0, 10.0, 0))
            .unwrap()
            .unwrap();

        assert_eq!(outcome.traded, 20.0);
        assert!((outcome.traded_price - 10.5).abs() < 1e-9);
        assert!(!ledger.reconcile(&algo).unwrap().finished);
    }

    #[test]
    fn test_duplicate_fill_is_noop() {
        let (mut ledger, algo) = ledger_with_order(100.0, 20.0);
        let fill = Fill::new("F1", OrderId::from("X1"), 10.0, 5.0, 0);

        assert!(ledger.record_fill(&fill).unwrap().is_some());
        assert!(ledger.record_fill(&fill).unwrap().is_none());
        assert_eq!(ledger.position(&algo).unwrap().traded, 5.0);
        assert_eq!(ledger.position(&algo).unwrap().fill_count, 1);
    }

    #[test]
    fn test_inconsistent_fills_rejected() {
        let (mut ledger, algo) = ledger_with_order(15.0, 20.0);

        let unknown = Fill::new("F0", OrderId::from("nope"), 10.0, 1.0, 0);
        assert!(matches!(ledger.record_fill(&unknown), Err(AlgoError::LedgerInconsistency(_))));

        let over_child = Fill::new("F1", OrderId::from("X1"), 10.0, 25.0, 0);
        assert!(matches!(ledger.record_fill(&over_child), Err(AlgoError::LedgerInconsistency(_))));

        let over_target = Fill::new("F2", OrderId::from("X1"), 10.0, 16.0, 0);
        assert!(matches!(ledger.record_fill(&over_target), Err(AlgoError::LedgerInconsistency(_))));
        assert_eq!(ledger.position(&algo).unwrap().traded, 0.0);

        // 거부된 체결 ID 는 기록되지 않음
        let valid = Fill::new("F2", OrderId::from("X1"), 10.0, 15.0, 0);
        assert!(ledger.record_fill(&valid).unwrap().is_some());
        assert!(ledger.reconcile(&algo).unwrap().finished);
    }

    #[test]
    fn test_terminal_status_never_regresses() {
        let (mut ledger, _algo) = ledger_with_order(100.0, 20.0);

        let cancelled = OrderUpdate::new("X1", OrderStatus::Cancelled, 5.0);
        assert!(ledger.record_update(&cancelled).unwrap().is_some());

        let late = OrderUpdate::new("L1", OrderStatus::Submitted, 0.0);
        assert!(ledger.record_update(&late).unwrap().is_none());

        let order = ledger.order(&OrderId::from("L1")).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.traded, 5.0);
        assert_eq!(order.committed(), 5.0);
    }

    #[test]
    fn test_over_reported_update_rejected() {
        let (mut ledger, algo) = ledger_with_order(50.0, 10.0);

        let inflated = OrderUpdate::new("X1", OrderStatus::Cancelled, 45.0);
        assert!(matches!(
            ledger.record_update(&inflated),
            Err(AlgoError::LedgerInconsistency(_))
        ));

        // 주문은 그대로 활성 상태, 점유 수량도 주문 크기 그대로
        let order = ledger.order(&OrderId::from("X1")).unwrap();
        assert_eq!(order.status, OrderStatus::Submitted);
        assert_eq!(order.traded, 0.0);
        assert_eq!(ledger.committed(&algo), 10.0);

        let valid = OrderUpdate::new("X1", OrderStatus::Cancelled, 4.0);
        assert!(ledger.record_update(&valid).unwrap().is_some());
        assert_eq!(ledger.committed(&algo), 4.0);
    }

    #[test]
    fn test_cancel_requested_once() {
        let (mut ledger, algo) = ledger_with_order(100.0, 20.0);

        assert!(ledger.mark_cancel_requested(&OrderId::from("L1")));
        assert!(!ledger.mark_cancel_requested(&OrderId::from("X1")));
        assert_eq!(ledger.active_orders(&algo).len(), 1);
        assert_eq!(ledger.committed(&algo), 20.0);
    }

    #[test]
    fn test_submission_requires_registered_algo() {
        let mut ledger = OrderLedger::new();
        let algo = AlgoId::from("TWAP_9");
        assert!(ledger.record_submission(submission(&algo, "L1", 1.0)).is_err());

        ledger.register_algo(&algo, 10.0);
        ledger.record_submission(submission(&algo, "L1", 1.0)).unwrap();
        assert!(ledger.record_submission(submission(&algo, "L1", 1.0)).is_err());

        ledger.remove_algo(&algo);
        assert!(ledger.order(&OrderId::from("L1")).is_none());
    }
}
