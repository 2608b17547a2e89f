/**
* filename : algo_instance
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::AlgoError;
use crate::models::algo::{AlgoId, AlgoParams, AlgoSnapshot, AlgoStatus};
use crate::models::market_data::TickSnapshot;
use crate::models::order::{ChildOrder, OrderSide};
use crate::models::trade::Fill;
use crate::strategies::{AlgoAction, AlgoContext, AlgoTemplate, TemplateKind};
use crate::utils::math::qty_is_zero;

/// 원장에서 가져온 인스턴스 현황 (템플릿 호출마다 새로 구성)
#[derive(Debug, Clone, Copy)]
pub struct LedgerView<'a> {
  pub committed: f64,
  pub tick: Option<&'a TickSnapshot>,
  pub active_orders: &'a [ChildOrder],
}

impl<'a> LedgerView<'a> {
  pub fn empty() -> Self {
    LedgerView { committed: 0.0, tick: None, active_orders: &[] }
  }
}

/// 부모 주문 정보
#[derive(Debug, Clone)]
pub struct AlgoInfo {
  pub id: AlgoId,
  pub kind: TemplateKind,
  pub instrument: String,
  pub side: OrderSide,
  /// 지정가 (없으면 호가 기준)
  pub price: Option<f64>,
  /// 목표 수량
  pub target: f64,
  /// 누적 체결 수량
  pub traded: f64,
  /// 가중 평균 체결가
  pub traded_price: f64,
  pub params: AlgoParams,
  pub created_at: DateTime<Utc>,
}

impl AlgoInfo {
  fn context<'a>(&'a self, view: &LedgerView<'a>) -> AlgoContext<'a> {
    AlgoContext {
      algo_id: &self.id,
      instrument: &self.instrument,
      side: self.side,
      price: self.price,
      target: self.target,
      traded: self.traded,
      committed: view.committed,
      tick: view.tick,
      active_orders: view.active_orders,
    }
  }
}

/// 알고리즘 인스턴스
///
/// 템플릿을 감싸 실행 상태(Created → Running ⇄ Paused → Stopped / Finished)를 관리한다.
/// Running 이 아닐 때 템플릿이 만든 신규 주문은 버려진다.
pub struct AlgoInstance {
  info: AlgoInfo,
  status: AlgoStatus,
  template: Box<dyn AlgoTemplate>,
}

impl AlgoInstance {
  /// 새 인스턴스 생성 (템플릿 파라미터 검증 포함)
  pub fn new(
    id: AlgoId,
    kind: TemplateKind,
    instrument: impl Into<String>,
    side: OrderSide,
    price: Option<f64>,
    quantity: f64,
    params: AlgoParams,
  ) -> Result<Self, AlgoError> {
    let instrument = instrument.into();
    if instrument.trim().is_empty() {
      return Err(AlgoError::ConfigError("instrument must not be empty".to_string()));
    }
    if !(quantity > 0.0 && quantity.is_finite()) {
      return Err(AlgoError::ConfigError(format!("quantity must be greater than 0, got {}", quantity)));
    }
    if let Some(price) = price {
      if !(price > 0.0 && price.is_finite()) {
        return Err(AlgoError::ConfigError(format!("price must be greater than 0, got {}", price)));
      }
    }

    let template = kind.build(&params)?;

    Ok(AlgoInstance {
      info: AlgoInfo {
        id,
        kind,
        instrument,
        side,
        price,
        target: quantity,
        traded: 0.0,
        traded_price: 0.0,
        params,
        created_at: Utc::now(),
      },
      status: AlgoStatus::Created,
      template,
    })
  }

  pub fn id(&self) -> &AlgoId {
    &self.info.id
  }

  pub fn kind(&self) -> TemplateKind {
    self.info.kind
  }

  pub fn instrument(&self) -> &str {
    &self.info.instrument
  }

  pub fn info(&self) -> &AlgoInfo {
    &self.info
  }

  pub fn status(&self) -> AlgoStatus {
    self.status
  }

  pub fn is_running(&self) -> bool {
    self.status == AlgoStatus::Running
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  fn invalid(&self, command: &'static str) -> AlgoError {
    AlgoError::InvalidStateTransition {
      algo_id: self.info.id.clone(),
      status: self.status,
      command,
    }
  }

  /// Created → Running
  pub fn start(&mut self, view: LedgerView<'_>) -> Result<(), AlgoError> {
    if self.status != AlgoStatus::Created {
      return Err(self.invalid("start"));
    }

    let ctx = self.info.context(&view);
    self.template.on_start(&ctx)?;
    self.status = AlgoStatus::Running;
    Ok(())
  }

  /// Running → Paused (주문 취소 없음)
  pub fn pause(&mut self) -> Result<(), AlgoError> {
    if self.status != AlgoStatus::Running {
      return Err(self.invalid("pause"));
    }
    self.status = AlgoStatus::Paused;
    Ok(())
  }

  /// Paused → Running
  pub fn resume(&mut self) -> Result<(), AlgoError> {
    if self.status != AlgoStatus::Paused {
      return Err(self.invalid("resume"));
    }
    self.status = AlgoStatus::Running;
    Ok(())
  }

  /// Running | Paused → Stopped. 활성 하위 주문 취소 목록 반환
  pub fn stop(&mut self, view: LedgerView<'_>) -> Result<Vec<AlgoAction>, AlgoError> {
    if !matches!(self.status, AlgoStatus::Running | AlgoStatus::Paused) {
      return Err(self.invalid("stop"));
    }

    let ctx = self.info.context(&view);
    let actions = self.template.on_stop(&ctx);
    self.status = AlgoStatus::Stopped;
    Ok(cancels_only(actions))
  }

  /// 목표 수량 도달 → Finished. 미체결 잔량이 남은 활성 주문 취소 목록 반환
  pub fn finish(&mut self, view: LedgerView<'_>) -> Vec<AlgoAction> {
    if self.status.is_terminal() {
      return Vec::new();
    }

    self.status = AlgoStatus::Finished;
    // 전량 체결된 주문은 상태 변경만 늦게 도착한 것
    self
      .info
      .context(&view)
      .working_orders()
      .filter(|order| !qty_is_zero(order.quantity - order.filled))
      .map(|order| AlgoAction::Cancel(order.order_id.clone()))
      .collect()
  }

  pub fn on_tick(&mut self, view: LedgerView<'_>, tick: &TickSnapshot) -> Result<Vec<AlgoAction>, AlgoError> {
    if !self.is_running() {
      return Ok(Vec::new());
    }
    let ctx = self.info.context(&view);
    self.template.on_tick(&ctx, tick)
  }

  pub fn on_timer(&mut self, view: LedgerView<'_>, elapsed: Duration) -> Result<Vec<AlgoAction>, AlgoError> {
    if !self.is_running() {
      return Ok(Vec::new());
    }
    let ctx = self.info.context(&view);
    self.template.on_timer(&ctx, elapsed)
  }

  /// 주문 상태 변경은 일시정지 중에도 템플릿에 전달 (신규 주문만 버림)
  pub fn on_order_update(&mut self, view: LedgerView<'_>, order: &ChildOrder) -> Result<Vec<AlgoAction>, AlgoError> {
    if self.is_terminal() {
      return Ok(Vec::new());
    }
    let ctx = self.info.context(&view);
    let actions = self.template.on_order_update(&ctx, order)?;
    Ok(self.filter_actions(actions))
  }

  pub fn on_fill(&mut self, view: LedgerView<'_>, fill: &Fill) -> Result<Vec<AlgoAction>, AlgoError> {
    if self.is_terminal() {
      return Ok(Vec::new());
    }
    let ctx = self.info.context(&view);
    let actions = self.template.on_fill(&ctx, fill)?;
    Ok(self.filter_actions(actions))
  }

  /// 원장 합산 결과 반영
  pub fn apply_fill(&mut self, traded: f64, traded_price: f64) {
    self.info.traded = traded;
    self.info.traded_price = traded_price;
  }

  fn filter_actions(&self, actions: Vec<AlgoAction>) -> Vec<AlgoAction> {
    if self.is_running() {
      return actions;
    }

    let before = actions.len();
    let kept = cancels_only(actions);
    if kept.len() != before {
      log::debug!("{}: {} 상태, 신규 주문 {}건 무시", self.info.id, self.status, before - kept.len());
    }
    kept
  }

  /// 상태 조회용 스냅샷
  pub fn snapshot(&self, active_orders: usize) -> AlgoSnapshot {
    AlgoSnapshot {
      algo_id: self.info.id.clone(),
      template: self.info.kind,
      instrument: self.info.instrument.clone(),
      side: self.info.side,
      price: self.info.price,
      quantity: self.info.target,
      traded: self.info.traded,
      left: (self.info.target - self.info.traded).max(0.0),
      traded_price: self.info.traded_price,
      status: self.status,
      parameters: self.info.params.clone(),
      variables: self.template.variables(),
      active_orders,
      created_at: self.info.created_at,
    }
  }
}

fn cancels_only(actions: Vec<AlgoAction>) -> Vec<AlgoAction> {
  actions
    .into_iter()
    .filter(|action| matches!(action, AlgoAction::Cancel(_)))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::order::{OrderId, OrderStatus};
  use crate::strategies::test_support::child_order;

  fn iceberg_instance() -> AlgoInstance {
    AlgoInstance::new(
      AlgoId::from("Iceberg_1"),
      TemplateKind::Iceberg,
      "XYZ",
      OrderSide::Buy,
      Some(10.0),
      50.0,
      AlgoParams::new().with("display_volume", 10),
    )
    .unwrap()
  }

  #[test]
  fn test_lifecycle_transitions() {
    let mut instance = iceberg_instance();
    assert_eq!(instance.status(), AlgoStatus::Created);
    assert!(instance.pause().is_err());

    instance.start(LedgerView::empty()).unwrap();
    instance.pause().unwrap();
    assert!(matches!(
      instance.pause(),
      Err(AlgoError::InvalidStateTransition { command: "pause", .. })
    ));
    instance.resume().unwrap();
    assert!(instance.resume().is_err());

    instance.stop(LedgerView::empty()).unwrap();
    assert_eq!(instance.status(), AlgoStatus::Stopped);
    for result in [instance.pause(), instance.resume()] {
      assert!(matches!(
        result,
        Err(AlgoError::InvalidStateTransition { status: AlgoStatus::Stopped, .. })
      ));
    }
    assert!(instance.stop(LedgerView::empty()).is_err());
    assert!(instance.start(LedgerView::empty()).is_err());
  }

  #[test]
  fn test_invalid_params_fail_on_create_or_start() {
    let missing = AlgoInstance::new(
      AlgoId::from("TWAP_1"),
      TemplateKind::Twap,
      "XYZ",
      OrderSide::Buy,
      None,
      100.0,
      AlgoParams::new(),
    );
    assert!(matches!(missing, Err(AlgoError::ConfigError(_))));

    let mut zero_slices = AlgoInstance::new(
      AlgoId::from("TWAP_2"),
      TemplateKind::Twap,
      "XYZ",
      OrderSide::Buy,
      None,
      100.0,
      AlgoParams::new().with("interval", 60).with("slice_count", 0),
    )
    .unwrap();
    assert!(matches!(zero_slices.start(LedgerView::empty()), Err(AlgoError::ConfigError(_))));
    assert_eq!(zero_slices.status(), AlgoStatus::Created);
  }

  #[test]
  fn test_paused_instance_ignores_ticks_and_drops_submissions() {
    let mut instance = iceberg_instance();
    instance.start(LedgerView::empty()).unwrap();
    instance.pause().unwrap();

    let tick = TickSnapshot::new("XYZ", 9.9, 10.1, 10.0, 0);
    let view = LedgerView { committed: 0.0, tick: Some(&tick), active_orders: &[] };
    assert!(instance.on_tick(view, &tick).unwrap().is_empty());

    // 체결 완료 통보는 전달되지만 재호가 주문은 버려짐
    let mut filled = child_order("A", instance.id(), 10.0, OrderStatus::Filled);
    filled.traded = 10.0;
    let view = LedgerView { committed: 10.0, tick: Some(&tick), active_orders: &[] };
    assert!(instance.on_order_update(view, &filled).unwrap().is_empty());

    instance.resume().unwrap();
    assert_eq!(instance.on_tick(view, &tick).unwrap().len(), 1);
  }

  #[test]
  fn test_stop_cancels_live_orders() {
    let mut instance = iceberg_instance();
    instance.start(LedgerView::empty()).unwrap();

    let live = vec![
      child_order("A", instance.id(), 10.0, OrderStatus::Submitted),
      child_order("B", instance.id(), 10.0, OrderStatus::PartiallyFilled),
    ];
    let view = LedgerView { committed: 20.0, tick: None, active_orders: &live };
    let actions = instance.stop(view).unwrap();
    assert_eq!(
      actions,
      vec![AlgoAction::Cancel(OrderId::from("A")), AlgoAction::Cancel(OrderId::from("B"))]
    );
  }

  #[test]
  fn test_finish_and_snapshot() {
    let mut instance = iceberg_instance();
    instance.start(LedgerView::empty()).unwrap();
    instance.apply_fill(50.0, 10.0);

    assert!(instance.finish(LedgerView::empty()).is_empty());
    assert_eq!(instance.status(), AlgoStatus::Finished);
    assert!(instance.pause().is_err());

    let snapshot = instance.snapshot(0);
    assert_eq!(snapshot.left, 0.0);
    assert_eq!(snapshot.template, TemplateKind::Iceberg);
    assert_eq!(snapshot.variables["display_volume"], 10.0);
  }
}
