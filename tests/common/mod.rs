//! 통합 테스트 공용 도우미

#![allow(dead_code)]

use std::sync::Arc;
use tokio::sync::RwLock;
use xAlgo::config::EngineConfig;
use xAlgo::core::engine::AlgoEngine;
use xAlgo::gateway::mocks::MockGateway;
use xAlgo::models::order::{OrderId, OrderRequest};
use xAlgo::{AlgoId, Fill, OrderStatus, OrderUpdate, TickSnapshot};

pub fn setup(max_running_per_instrument: usize) -> (AlgoEngine, Arc<RwLock<MockGateway>>) {
  let gateway = Arc::new(RwLock::new(MockGateway::new()));
  // 엔진 태스크 타이머는 테스트가 직접 보내는 Timer 이벤트와 섞이지 않도록 길게
  let config = EngineConfig {
    max_running_per_instrument,
    timer_interval_ms: 3_600_000,
    ..EngineConfig::default()
  };
  let engine = AlgoEngine::new(config, gateway.clone());
  (engine, gateway)
}

pub fn tick(bid: f64, ask: f64) -> TickSnapshot {
  TickSnapshot::new("XYZ", bid, ask, (bid + ask) / 2.0, 0)
}

/// 게이트웨이가 받은 주문 (거래소 ID, 요청)
pub async fn submitted(gateway: &Arc<RwLock<MockGateway>>) -> Vec<(OrderId, OrderRequest)> {
  gateway.read().await.submitted().to_vec()
}

pub async fn submitted_for(gateway: &Arc<RwLock<MockGateway>>, algo_id: &AlgoId) -> usize {
  gateway
    .read()
    .await
    .submitted()
    .iter()
    .filter(|(_, request)| &request.algo_id == algo_id)
    .count()
}

pub async fn cancel_count(gateway: &Arc<RwLock<MockGateway>>) -> usize {
  gateway.read().await.cancels().len()
}

/// 주문 전량 체결: 체결 이벤트 후 Filled 상태 변경
pub async fn fill_completely(engine: &mut AlgoEngine, exchange_id: &OrderId, fill_id: &str, price: f64, quantity: f64) {
  engine
    .dispatch_fill(Fill::new(fill_id, exchange_id.clone(), price, quantity, 0))
    .await
    .unwrap();
  engine
    .dispatch_order_update(OrderUpdate::new(exchange_id.0.clone(), OrderStatus::Filled, quantity))
    .await
    .unwrap();
}
