//! Iceberg 관련 테스트

mod common;

use xAlgo::{AlgoParams, AlgoStatus, Fill, OrderSide, OrderStatus, OrderUpdate, TemplateKind};

use common::{cancel_count, fill_completely, setup, submitted, tick};

#[tokio::test]
async fn test_iceberg_requotes_once_per_filled_slice() {
  // 설정 및 모의 거래소 초기화
  let (mut engine, gateway) = setup(5);
  let params = AlgoParams::new().with("display_volume", 10);
  let algo_id = engine
    .create_instance(TemplateKind::Iceberg, "XYZ", OrderSide::Buy, Some(10.0), 50.0, params)
    .unwrap();
  engine.start_instance(&algo_id).await.unwrap();

  // 첫 호가에서 첫 노출 주문
  engine.dispatch_tick(tick(9.99, 10.01)).await;
  assert_eq!(gateway.read().await.submitted().len(), 1);

  // 노출 주문이 체결될 때마다 정확히 하나의 새 주문
  for slice in 1..=5usize {
    let orders = submitted(&gateway).await;
    assert_eq!(orders.len(), slice);
    let (exchange_id, request) = orders[slice - 1].clone();
    assert_eq!(request.quantity, 10.0);
    assert_eq!(request.price, 10.0);

    // 호가가 추가로 들어와도 활성 주문이 있으면 재제출하지 않음
    engine.dispatch_tick(tick(9.98, 10.02)).await;
    assert_eq!(gateway.read().await.submitted().len(), slice);

    fill_completely(&mut engine, &exchange_id, &format!("fill-{}", slice), 10.0, 10.0).await;
  }

  assert_eq!(gateway.read().await.submitted().len(), 5);
  assert_eq!(cancel_count(&gateway).await, 0);

  let snapshot = engine.query_status(&algo_id).unwrap();
  assert_eq!(snapshot.status, AlgoStatus::Finished);
  assert_eq!(snapshot.traded, 50.0);
  assert_eq!(snapshot.left, 0.0);
  assert_eq!(snapshot.traded_price, 10.0);

  // 종료 후 호가는 무시
  engine.dispatch_tick(tick(9.99, 10.01)).await;
  assert_eq!(gateway.read().await.submitted().len(), 5);
}

#[tokio::test]
async fn test_iceberg_status_before_fill() {
  let (mut engine, gateway) = setup(5);
  let params = AlgoParams::new().with("display_volume", 10);
  let algo_id = engine
    .create_instance(TemplateKind::Iceberg, "XYZ", OrderSide::Sell, Some(10.5), 20.0, params)
    .unwrap();
  engine.start_instance(&algo_id).await.unwrap();
  engine.dispatch_tick(tick(10.4, 10.6)).await;

  let (first, _) = submitted(&gateway).await[0].clone();

  // Filled 상태가 체결보다 먼저 도착해도 다음 노출 주문은 한 번만
  engine
    .dispatch_order_update(OrderUpdate::new(first.0.clone(), OrderStatus::Filled, 10.0))
    .await
    .unwrap();
  assert_eq!(gateway.read().await.submitted().len(), 2);

  engine
    .dispatch_fill(Fill::new("f-1", first.clone(), 10.5, 10.0, 0))
    .await
    .unwrap();
  assert_eq!(gateway.read().await.submitted().len(), 2);

  // 같은 상태 변경 재전달은 무시
  engine
    .dispatch_order_update(OrderUpdate::new(first.0.clone(), OrderStatus::Filled, 10.0))
    .await
    .unwrap();
  assert_eq!(gateway.read().await.submitted().len(), 2);

  let (second, _) = submitted(&gateway).await[1].clone();
  fill_completely(&mut engine, &second, "f-2", 10.5, 10.0).await;

  assert_eq!(engine.status_of(&algo_id), Some(AlgoStatus::Finished));
  assert_eq!(gateway.read().await.submitted().len(), 2);
}

#[tokio::test]
async fn test_iceberg_requotes_after_external_cancel() {
  let (mut engine, gateway) = setup(5);
  let params = AlgoParams::new().with("display_volume", 10);
  let algo_id = engine
    .create_instance(TemplateKind::Iceberg, "XYZ", OrderSide::Buy, None, 30.0, params)
    .unwrap();
  engine.start_instance(&algo_id).await.unwrap();
  engine.dispatch_tick(tick(9.9, 10.1)).await;

  let (first, request) = submitted(&gateway).await[0].clone();
  assert_eq!(request.price, 9.9);

  // 부분 체결 후 거래소 취소 → 잔량 기준으로 다음 노출 주문
  engine
    .dispatch_fill(Fill::new("p-1", first.clone(), 9.9, 4.0, 0))
    .await
    .unwrap();
  engine
    .dispatch_order_update(OrderUpdate::new(first.0.clone(), OrderStatus::Cancelled, 4.0))
    .await
    .unwrap();

  let orders = submitted(&gateway).await;
  assert_eq!(orders.len(), 2);
  assert_eq!(orders[1].1.quantity, 10.0);

  let snapshot = engine.query_status(&algo_id).unwrap();
  assert_eq!(snapshot.traded, 4.0);
  assert_eq!(snapshot.status, AlgoStatus::Running);
}

#[tokio::test]
async fn test_iceberg_ignores_over_reported_update() {
  let (mut engine, gateway) = setup(5);
  let params = AlgoParams::new().with("display_volume", 10);
  let algo_id = engine
    .create_instance(TemplateKind::Iceberg, "XYZ", OrderSide::Buy, Some(10.0), 50.0, params)
    .unwrap();
  engine.start_instance(&algo_id).await.unwrap();
  engine.dispatch_tick(tick(9.99, 10.01)).await;

  let (first, _) = submitted(&gateway).await[0].clone();

  // 주문 크기보다 큰 체결량을 보고한 상태 변경은 원장 불일치로 버려짐
  let result = engine
    .dispatch_order_update(OrderUpdate::new(first.0.clone(), OrderStatus::Cancelled, 45.0))
    .await;
  assert!(matches!(result, Err(xAlgo::AlgoError::LedgerInconsistency(_))));
  assert_eq!(engine.ledger().committed(&algo_id), 10.0);
  assert_eq!(gateway.read().await.submitted().len(), 1);

  // 정상 종료 이후 노출 주문은 계속 display_volume 크기
  fill_completely(&mut engine, &first, "ok-1", 10.0, 10.0).await;
  let orders = submitted(&gateway).await;
  assert_eq!(orders.len(), 2);
  assert_eq!(orders[1].1.quantity, 10.0);
  assert_eq!(engine.status_of(&algo_id), Some(AlgoStatus::Running));
}
