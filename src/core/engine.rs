/**
* filename : engine
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::core::algo_instance::{AlgoInstance, LedgerView};
use crate::error::AlgoError;
use crate::gateway::traits::Gateway;
use crate::models::algo::{AlgoId, AlgoParams, AlgoSnapshot, AlgoStatus, StartRequest};
use crate::models::market_data::TickSnapshot;
use crate::models::order::{ChildOrder, OrderId, OrderRequest, OrderSide, OrderSpec, OrderStatus, OrderUpdate};
use crate::models::trade::Fill;
use crate::order_core::ledger::OrderLedger;
use crate::order_core::validator::{BasicOrderValidator, OrderValidator};
use crate::strategies::{AlgoAction, TemplateKind};
use crate::utils::{current_timestamp_ms, logging};
use crate::utils::math::QTY_EPSILON;

/// 알고리즘 실행 엔진
///
/// 인스턴스 레지스트리와 하위 주문 원장을 소유하고, 게이트웨이 이벤트를
/// 해당 인스턴스로 라우팅한다. 단일 태스크(`core::service`)에서만 변경된다.
pub struct AlgoEngine {
  config: EngineConfig,
  gateway: Arc<RwLock<dyn Gateway>>,
  instances: BTreeMap<AlgoId, AlgoInstance>,
  /// 종목 → 실행 중(종료 전) 인스턴스
  symbol_map: HashMap<String, Vec<AlgoId>>,
  subscribed: HashSet<String>,
  ledger: OrderLedger,
  /// 종목별 최신 호가
  ticks: HashMap<String, TickSnapshot>,
  validators: Vec<Box<dyn OrderValidator>>,
  algo_counters: HashMap<TemplateKind, u64>,
  order_counter: u64,
  updates: broadcast::Sender<AlgoSnapshot>,
  /// 인스턴스별 마지막 타이머 기준 시각 (시작/재개 시 갱신)
  timer_marks: HashMap<AlgoId, Instant>,
  /// 마지막으로 처리한 타이머 시각
  last_clock: Option<Instant>,
}

impl AlgoEngine {
  pub fn new(config: EngineConfig, gateway: Arc<RwLock<dyn Gateway>>) -> Self {
    let (updates, _) = broadcast::channel(config.event_buffer.max(1));
    let validators: Vec<Box<dyn OrderValidator>> = vec![Box::new(BasicOrderValidator::new(
      config.min_order_size,
      config.max_order_size,
    ))];

    AlgoEngine {
      config,
      gateway,
      instances: BTreeMap::new(),
      symbol_map: HashMap::new(),
      subscribed: HashSet::new(),
      ledger: OrderLedger::new(),
      ticks: HashMap::new(),
      validators,
      algo_counters: HashMap::new(),
      order_counter: 0,
      updates,
      timer_marks: HashMap::new(),
      last_clock: None,
    }
  }

  /// 하위 주문 검증기 추가
  pub fn add_validator(&mut self, validator: Box<dyn OrderValidator>) {
    self.validators.push(validator);
  }

  /// 인스턴스 상태 변경 구독
  pub fn subscribe_updates(&self) -> broadcast::Receiver<AlgoSnapshot> {
    self.updates.subscribe()
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn gateway(&self) -> Arc<RwLock<dyn Gateway>> {
    self.gateway.clone()
  }

  pub fn ledger(&self) -> &OrderLedger {
    &self.ledger
  }

  // ---------------------------------------------------------------- commands

  /// 인스턴스 생성 (Created). 파라미터 오류는 ConfigError
  pub fn create_instance(
    &mut self,
    kind: TemplateKind,
    instrument: &str,
    side: OrderSide,
    price: Option<f64>,
    quantity: f64,
    params: AlgoParams,
  ) -> Result<AlgoId, AlgoError> {
    let seq = self.algo_counters.get(&kind).copied().unwrap_or(0) + 1;
    let algo_id = AlgoId(format!("{}_{}", kind.name(), seq));

    let instance = AlgoInstance::new(algo_id.clone(), kind, instrument, side, price, quantity, params)?;
    self.algo_counters.insert(kind, seq);
    self.ledger.register_algo(&algo_id, quantity);
    self.instances.insert(algo_id.clone(), instance);

    log::debug!("{}: 생성 - {} {} {}", algo_id, instrument, side, quantity);
    self.publish(&algo_id);
    Ok(algo_id)
  }

  /// Created → Running
  ///
  /// 템플릿 검증에 실패하면 인스턴스는 레지스트리에서 제거된다.
  pub async fn start_instance(&mut self, algo_id: &AlgoId) -> Result<(), AlgoError> {
    let (status, instrument) = {
      let instance = self.instance(algo_id)?;
      (instance.status(), instance.instrument().to_string())
    };
    if status == AlgoStatus::Created {
      self.ensure_capacity(&instrument)?;
    }

    if let Err(err) = self.invoke(algo_id, |instance, view| instance.start(view)) {
      if matches!(err, AlgoError::ConfigError(_)) {
        logging::log_error(&format!("{} 시작 실패", algo_id), &err);
        self.remove_instance(algo_id);
      }
      return Err(err);
    }

    self.symbol_map.entry(instrument.clone()).or_default().push(algo_id.clone());
    self.ensure_subscribed(&instrument).await;
    self.mark_timer(algo_id);

    logging::log_algo(algo_id, "알고리즘 시작");
    self.publish(algo_id);
    Ok(())
  }

  /// 생성 후 바로 시작. 시작 실패 시 생성된 인스턴스는 남기지 않는다.
  pub async fn start(&mut self, request: StartRequest) -> Result<AlgoId, AlgoError> {
    let algo_id = self.create_instance(
      request.template,
      &request.instrument,
      request.side,
      request.price,
      request.quantity,
      request.params,
    )?;

    if let Err(err) = self.start_instance(&algo_id).await {
      self.remove_instance(&algo_id);
      return Err(err);
    }
    Ok(algo_id)
  }

  /// Running → Paused
  pub fn pause(&mut self, algo_id: &AlgoId) -> Result<(), AlgoError> {
    self.instance_mut(algo_id)?.pause()?;
    logging::log_algo(algo_id, "알고리즘 일시정지");
    self.publish(algo_id);
    Ok(())
  }

  /// Paused → Running (종목 동시 실행 제한 재확인)
  pub fn resume(&mut self, algo_id: &AlgoId) -> Result<(), AlgoError> {
    let (status, instrument) = {
      let instance = self.instance(algo_id)?;
      (instance.status(), instance.instrument().to_string())
    };
    if status == AlgoStatus::Paused {
      self.ensure_capacity(&instrument)?;
    }

    self.instance_mut(algo_id)?.resume()?;
    self.mark_timer(algo_id);
    logging::log_algo(algo_id, "알고리즘 재개");
    self.publish(algo_id);
    Ok(())
  }

  /// Running | Paused → Stopped. 활성 하위 주문마다 한 번씩 취소 요청
  pub async fn stop(&mut self, algo_id: &AlgoId) -> Result<(), AlgoError> {
    let cancels = self.invoke(algo_id, |instance, view| instance.stop(view))?;
    self.release_symbol(algo_id);

    logging::log_algo(algo_id, &format!("알고리즘 중지, 취소 요청 {}건", cancels.len()));
    self.run_actions(algo_id, cancels).await;
    self.publish(algo_id);
    Ok(())
  }

  /// 실행 중/일시정지 인스턴스 전체 중지
  pub async fn stop_all(&mut self) -> usize {
    let ids: Vec<AlgoId> = self
      .instances
      .values()
      .filter(|i| matches!(i.status(), AlgoStatus::Running | AlgoStatus::Paused))
      .map(|i| i.id().clone())
      .collect();

    let mut stopped = 0;
    for algo_id in ids {
      match self.stop(&algo_id).await {
        Ok(()) => stopped += 1,
        Err(err) => logging::log_error(&format!("{} 중지", algo_id), &err),
      }
    }
    stopped
  }

  pub fn query_status(&self, algo_id: &AlgoId) -> Result<AlgoSnapshot, AlgoError> {
    let instance = self.instance(algo_id)?;
    Ok(instance.snapshot(self.ledger.active_orders(algo_id).len()))
  }

  pub fn list_instances(&self) -> Vec<AlgoSnapshot> {
    self
      .instances
      .values()
      .map(|i| i.snapshot(self.ledger.active_orders(i.id()).len()))
      .collect()
  }

  pub fn status_of(&self, algo_id: &AlgoId) -> Option<AlgoStatus> {
    self.instances.get(algo_id).map(|i| i.status())
  }

  // ---------------------------------------------------------------- dispatch

  /// 호가 전달. 인스턴스 오류는 격리되어 반환되며 나머지 인스턴스 처리는 계속된다.
  pub async fn dispatch_tick(&mut self, tick: TickSnapshot) -> Vec<(AlgoId, AlgoError)> {
    self.ticks.insert(tick.instrument.clone(), tick.clone());

    let ids = self.symbol_map.get(&tick.instrument).cloned().unwrap_or_default();
    let mut errors = Vec::new();

    for algo_id in ids {
      if !self.is_running(&algo_id) {
        continue;
      }
      match self.invoke(&algo_id, |instance, view| instance.on_tick(view, &tick)) {
        Ok(actions) => self.run_actions(&algo_id, actions).await,
        Err(err) => {
          self.isolate(&algo_id, &err).await;
          errors.push((algo_id, err));
        }
      }
    }
    errors
  }

  /// 주기 타이머 전달 (Running 인스턴스만, 모든 인스턴스에 같은 경과 시간)
  pub async fn dispatch_timer(&mut self, elapsed: Duration) -> Vec<(AlgoId, AlgoError)> {
    let mut errors = Vec::new();
    for algo_id in self.running_ids() {
      if let Err(err) = self.fire_timer(&algo_id, elapsed).await {
        errors.push((algo_id, err));
      }
    }
    errors
  }

  /// 시각 기반 타이머 전달
  ///
  /// 각 인스턴스는 시작/재개 시점 또는 직전 타이머 이후 경과 시간만 받는다.
  pub async fn dispatch_clock(&mut self, now: Instant) -> Vec<(AlgoId, AlgoError)> {
    self.last_clock = Some(self.last_clock.map_or(now, |last| last.max(now)));

    let mut errors = Vec::new();
    for algo_id in self.running_ids() {
      let mark = self.timer_marks.insert(algo_id.clone(), now).unwrap_or(now);
      let elapsed = now.saturating_duration_since(mark);
      if let Err(err) = self.fire_timer(&algo_id, elapsed).await {
        errors.push((algo_id, err));
      }
    }
    errors
  }

  fn running_ids(&self) -> Vec<AlgoId> {
    self
      .instances
      .values()
      .filter(|i| i.is_running())
      .map(|i| i.id().clone())
      .collect()
  }

  async fn fire_timer(&mut self, algo_id: &AlgoId, elapsed: Duration) -> Result<(), AlgoError> {
    match self.invoke(algo_id, |instance, view| instance.on_timer(view, elapsed)) {
      Ok(actions) => {
        self.run_actions(algo_id, actions).await;
        Ok(())
      }
      Err(err) => {
        self.isolate(algo_id, &err).await;
        Err(err)
      }
    }
  }

  /// 타이머 기준 시각 갱신. 시각은 마지막 타이머보다 뒤로 가지 않는다.
  fn mark_timer(&mut self, algo_id: &AlgoId) {
    let now = Instant::now();
    let mark = self.last_clock.map_or(now, |last| last.max(now));
    self.timer_marks.insert(algo_id.clone(), mark);
  }

  /// 주문 상태 변경 전달
  ///
  /// 원장은 항상 갱신되고, 인스턴스가 종료되지 않았을 때만 템플릿에 전달된다.
  pub async fn dispatch_order_update(&mut self, update: OrderUpdate) -> Result<(), AlgoError> {
    let order = match self.ledger.record_update(&update) {
      Ok(Some(order)) => order,
      Ok(None) => return Ok(()),
      Err(err) => {
        logging::log_error("주문 상태 반영", &err);
        return Err(err);
      }
    };

    if order.status == OrderStatus::Rejected {
      logging::log_error(
        &format!("{} 주문 {}", order.algo_id, order.order_id),
        &AlgoError::GatewayRejected(format!("order {} rejected by gateway", order.order_id)),
      );
    }

    self.route_order_update(&order).await
  }

  /// 체결 전달: 원장 합산 → 인스턴스 반영 → 목표 도달 시 Finished
  pub async fn dispatch_fill(&mut self, fill: Fill) -> Result<(), AlgoError> {
    let outcome = match self.ledger.record_fill(&fill) {
      Ok(Some(outcome)) => outcome,
      Ok(None) => return Ok(()),
      Err(err) => {
        logging::log_error("체결 반영", &err);
        return Err(err);
      }
    };

    let algo_id = outcome.algo_id.clone();
    let terminal = match self.instances.get_mut(&algo_id) {
      Some(instance) => {
        instance.apply_fill(outcome.traded, outcome.traded_price);
        instance.is_terminal()
      }
      None => return Ok(()),
    };
    logging::log_fill(&algo_id, &fill.order_id, fill.quantity, fill.price, outcome.traded);

    if terminal {
      self.publish(&algo_id);
      return Ok(());
    }

    let finished = self.ledger.reconcile(&algo_id).map(|r| r.finished).unwrap_or(false);
    if finished {
      self.finish_instance(&algo_id).await;
      return Ok(());
    }

    match self.invoke(&algo_id, |instance, view| instance.on_fill(view, &fill)) {
      Ok(actions) => self.run_actions(&algo_id, actions).await,
      Err(err) => {
        self.isolate(&algo_id, &err).await;
        self.publish(&algo_id);
        return Err(err);
      }
    }
    self.publish(&algo_id);
    Ok(())
  }

  // ---------------------------------------------------------------- orders

  /// 하위 주문 제출
  ///
  /// 원장 기록 후 게이트웨이를 호출하고, 응답으로 받은 거래소 ID 를 연결한다.
  pub async fn submit_child_order(&mut self, algo_id: &AlgoId, spec: OrderSpec) -> Result<OrderId, AlgoError> {
    let request = self.prepare_child_order(algo_id, spec)?;
    self.send_child_order(request).await
  }

  fn prepare_child_order(&mut self, algo_id: &AlgoId, spec: OrderSpec) -> Result<OrderRequest, AlgoError> {
    let (instrument, side, target) = {
      let instance = self.instance(algo_id)?;
      if !instance.is_running() {
        return Err(AlgoError::InvalidStateTransition {
          algo_id: algo_id.clone(),
          status: instance.status(),
          command: "submit",
        });
      }
      let info = instance.info();
      (info.instrument.clone(), info.side, info.target)
    };

    let available = target - self.ledger.committed(algo_id);
    if spec.quantity > available + QTY_EPSILON {
      return Err(AlgoError::LedgerInconsistency(format!(
        "{} requested {} but only {} is available",
        algo_id, spec.quantity, available
      )));
    }

    let request = OrderRequest {
      order_id: self.next_order_id(),
      algo_id: algo_id.clone(),
      instrument,
      side,
      order_type: spec.order_type,
      price: spec.price,
      quantity: spec.quantity,
      reference: algo_id.to_string(),
      created_at: current_timestamp_ms(),
    };

    for validator in &self.validators {
      validator.validate(&request)?;
    }

    self.ledger.record_submission(ChildOrder::from_request(&request))?;
    logging::log_order_submitted(&request);
    Ok(request)
  }

  async fn send_child_order(&mut self, request: OrderRequest) -> Result<OrderId, AlgoError> {
    let local_id = request.order_id.clone();
    let gateway = self.gateway.clone();
    let result = gateway.write().await.submit_order(request).await;

    match result {
      Ok(exchange_id) => {
        self.ledger.attach_exchange_id(&local_id, exchange_id)?;
        Ok(local_id)
      }
      Err(err) => {
        // 게이트웨이 거부는 Rejected 상태 변경으로 취급
        let rejected = OrderUpdate::new(local_id.0.clone(), OrderStatus::Rejected, 0.0);
        self.ledger.record_update(&rejected)?;
        Err(AlgoError::GatewayRejected(format!("{}: {}", local_id, err)))
      }
    }
  }

  /// 하위 주문 취소 (주문당 한 번)
  async fn cancel_child_order(&mut self, algo_id: &AlgoId, order_id: &OrderId) {
    let order = match self.ledger.order(order_id) {
      Some(order) if &order.algo_id == algo_id => order.clone(),
      Some(_) => {
        log::warn!("{}: 다른 알고리즘의 주문 {} 취소 시도 무시", algo_id, order_id);
        return;
      }
      None => {
        log::warn!("{}: 알 수 없는 주문 {} 취소 시도 무시", algo_id, order_id);
        return;
      }
    };

    if !self.ledger.mark_cancel_requested(&order.order_id) {
      return;
    }

    logging::log_order_cancelled(algo_id, &order.order_id);
    let gateway = self.gateway.clone();
    let result = gateway.write().await.cancel_order(order.cancel_request()).await;
    if let Err(err) = result {
      logging::log_error(&format!("{} 주문 {} 취소", algo_id, order.order_id), &err);
    }
  }

  /// 템플릿 결정 실행. 제출 실패로 생긴 후속 결정도 같은 큐에서 처리한다.
  async fn run_actions(&mut self, algo_id: &AlgoId, actions: Vec<AlgoAction>) {
    let mut queue: VecDeque<AlgoAction> = actions.into();

    while let Some(action) = queue.pop_front() {
      match action {
        AlgoAction::Submit(spec) => {
          let request = match self.prepare_child_order(algo_id, spec) {
            Ok(request) => request,
            Err(AlgoError::InvalidStateTransition { status, .. }) => {
              log::debug!("{}: {} 상태, 신규 주문 무시", algo_id, status);
              continue;
            }
            Err(err) => {
              logging::log_error(&format!("{} 주문 준비", algo_id), &err);
              continue;
            }
          };

          let local_id = request.order_id.clone();
          if let Err(err) = self.send_child_order(request).await {
            logging::log_error(&format!("{} 주문 제출", algo_id), &err);
            if let Some(order) = self.ledger.order(&local_id).cloned() {
              queue.extend(self.notify_order(&order));
            }
          }
        }
        AlgoAction::Cancel(order_id) => self.cancel_child_order(algo_id, &order_id).await,
      }
    }
  }

  // ---------------------------------------------------------------- internals

  async fn route_order_update(&mut self, order: &ChildOrder) -> Result<(), AlgoError> {
    let algo_id = order.algo_id.clone();
    match self.instances.get(&algo_id) {
      Some(instance) if !instance.is_terminal() => {}
      _ => return Ok(()),
    }

    match self.invoke(&algo_id, |instance, view| instance.on_order_update(view, order)) {
      Ok(actions) => {
        self.run_actions(&algo_id, actions).await;
        self.publish(&algo_id);
        Ok(())
      }
      Err(err) => {
        self.isolate(&algo_id, &err).await;
        Err(err)
      }
    }
  }

  /// 제출 실패 주문을 템플릿에 통보하고 후속 결정을 돌려준다
  fn notify_order(&mut self, order: &ChildOrder) -> Vec<AlgoAction> {
    let algo_id = order.algo_id.clone();
    match self.invoke(&algo_id, |instance, view| instance.on_order_update(view, order)) {
      Ok(actions) => actions,
      Err(err) => self.force_stop(&algo_id, &err),
    }
  }

  /// 템플릿 오류 격리: 로그 후 설정에 따라 강제 중지
  async fn isolate(&mut self, algo_id: &AlgoId, err: &AlgoError) {
    let cancels = self.force_stop(algo_id, err);
    self.run_actions(algo_id, cancels).await;
    self.publish(algo_id);
  }

  fn force_stop(&mut self, algo_id: &AlgoId, err: &AlgoError) -> Vec<AlgoAction> {
    logging::log_error(&format!("{} 실행", algo_id), err);
    if !self.config.stop_on_error {
      return Vec::new();
    }

    match self.invoke(algo_id, |instance, view| instance.stop(view)) {
      Ok(cancels) => {
        self.release_symbol(algo_id);
        log::warn!("{}: 오류로 강제 중지", algo_id);
        cancels
      }
      Err(_) => Vec::new(),
    }
  }

  async fn finish_instance(&mut self, algo_id: &AlgoId) {
    let cancels = match self.invoke(algo_id, |instance, view| Ok(instance.finish(view))) {
      Ok(cancels) => cancels,
      Err(_) => return,
    };
    self.release_symbol(algo_id);

    logging::log_algo(algo_id, "목표 수량 체결 완료");
    self.run_actions(algo_id, cancels).await;
    self.publish(algo_id);
  }

  /// 템플릿 호출: 원장 현황과 최신 호가를 묶어 인스턴스에 전달
  fn invoke<T, F>(&mut self, algo_id: &AlgoId, f: F) -> Result<T, AlgoError>
  where
    F: FnOnce(&mut AlgoInstance, LedgerView<'_>) -> Result<T, AlgoError>,
  {
    let instance = self
      .instances
      .get_mut(algo_id)
      .ok_or_else(|| AlgoError::AlgoNotFound(algo_id.clone()))?;
    let active_orders = self.ledger.active_orders(algo_id);
    let view = LedgerView {
      committed: self.ledger.committed(algo_id),
      tick: self.ticks.get(instance.instrument()),
      active_orders: &active_orders,
    };
    f(instance, view)
  }

  fn instance(&self, algo_id: &AlgoId) -> Result<&AlgoInstance, AlgoError> {
    self
      .instances
      .get(algo_id)
      .ok_or_else(|| AlgoError::AlgoNotFound(algo_id.clone()))
  }

  fn instance_mut(&mut self, algo_id: &AlgoId) -> Result<&mut AlgoInstance, AlgoError> {
    self
      .instances
      .get_mut(algo_id)
      .ok_or_else(|| AlgoError::AlgoNotFound(algo_id.clone()))
  }

  fn is_running(&self, algo_id: &AlgoId) -> bool {
    self.instances.get(algo_id).map(|i| i.is_running()).unwrap_or(false)
  }

  fn ensure_capacity(&self, instrument: &str) -> Result<(), AlgoError> {
    let running = self
      .instances
      .values()
      .filter(|i| i.instrument() == instrument && i.is_running())
      .count();

    if running >= self.config.max_running_per_instrument {
      return Err(AlgoError::CapacityExceeded {
        instrument: instrument.to_string(),
        limit: self.config.max_running_per_instrument,
      });
    }
    Ok(())
  }

  async fn ensure_subscribed(&mut self, instrument: &str) {
    if self.subscribed.contains(instrument) {
      return;
    }

    let gateway = self.gateway.clone();
    let result = gateway.write().await.subscribe(instrument).await;
    match result {
      Ok(()) => {
        self.subscribed.insert(instrument.to_string());
        log::info!("{} 시세 구독", instrument);
      }
      Err(err) => logging::log_error(&format!("{} 시세 구독", instrument), &err),
    }
  }

  fn release_symbol(&mut self, algo_id: &AlgoId) {
    let instrument = match self.instances.get(algo_id) {
      Some(instance) => instance.instrument().to_string(),
      None => return,
    };
    if let Some(ids) = self.symbol_map.get_mut(&instrument) {
      ids.retain(|id| id != algo_id);
      if ids.is_empty() {
        self.symbol_map.remove(&instrument);
      }
    }
  }

  fn remove_instance(&mut self, algo_id: &AlgoId) {
    self.release_symbol(algo_id);
    self.instances.remove(algo_id);
    self.timer_marks.remove(algo_id);
    self.ledger.remove_algo(algo_id);
    log::debug!("{}: 레지스트리에서 제거", algo_id);
  }

  fn next_order_id(&mut self) -> OrderId {
    self.order_counter += 1;
    OrderId(format!("ALGO-{:06}", self.order_counter))
  }

  fn publish(&self, algo_id: &AlgoId) {
    if let Some(instance) = self.instances.get(algo_id) {
      let snapshot = instance.snapshot(self.ledger.active_orders(algo_id).len());
      // 구독자가 없으면 버려짐
      let _ = self.updates.send(snapshot);
    }
  }
}
