use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AlgoError;
use crate::gateway::traits::{Gateway, GatewayEvent};
use crate::models::market_data::TickSnapshot;
use crate::models::order::{CancelRequest, OrderId, OrderRequest, OrderStatus, OrderUpdate};

/// A gateway that acknowledges and records orders without sending them anywhere.
///
/// Orders are never filled. Acknowledgements and cancellations are published as
/// order events so the engine sees the same flow as with a live broker.
pub struct DryRunGateway {
  events: broadcast::Sender<GatewayEvent>,
  orders: HashMap<OrderId, OrderRequest>,
  subscriptions: HashSet<String>,
}

impl DryRunGateway {
  pub fn new(buffer: usize) -> Self {
    let (events, _) = broadcast::channel(buffer.max(1));
    Self { events, orders: HashMap::new(), subscriptions: HashSet::new() }
  }

  /// Push a market data snapshot to subscribers (manual feed)
  pub fn publish_tick(&self, tick: TickSnapshot) {
    if !self.subscriptions.contains(&tick.instrument) {
      log::debug!("[dry-run] {} 미구독 종목 호가 전달", tick.instrument);
    }
    self.publish(GatewayEvent::Tick(tick));
  }

  /// Orders accepted so far, keyed by exchange id
  pub fn orders(&self) -> &HashMap<OrderId, OrderRequest> {
    &self.orders
  }

  pub fn is_subscribed(&self, instrument: &str) -> bool {
    self.subscriptions.contains(instrument)
  }

  fn publish(&self, event: GatewayEvent) {
    // 수신자가 없으면 버려짐
    let _ = self.events.send(event);
  }
}

#[async_trait]
impl Gateway for DryRunGateway {
  async fn submit_order(&mut self, request: OrderRequest) -> Result<OrderId, AlgoError> {
    let exchange_id = OrderId(format!("dry-{}", Uuid::new_v4()));
    log::info!(
      "[dry-run] {} {} {} {}@{} -> {}",
      request.order_id, request.instrument, request.side, request.quantity, request.price, exchange_id
    );

    self.orders.insert(exchange_id.clone(), request);
    self.publish(GatewayEvent::Order(OrderUpdate::new(exchange_id.0.clone(), OrderStatus::Submitted, 0.0)));
    Ok(exchange_id)
  }

  async fn cancel_order(&mut self, request: CancelRequest) -> Result<(), AlgoError> {
    let id = request.exchange_order_id.unwrap_or(request.order_id);
    if self.orders.remove(&id).is_none() {
      return Err(AlgoError::OrderNotFound(id));
    }

    log::info!("[dry-run] cancel {}", id);
    self.publish(GatewayEvent::Order(OrderUpdate::new(id.0, OrderStatus::Cancelled, 0.0)));
    Ok(())
  }

  async fn subscribe(&mut self, instrument: &str) -> Result<(), AlgoError> {
    self.subscriptions.insert(instrument.to_string());
    Ok(())
  }

  fn subscribe_events(&self) -> broadcast::Receiver<GatewayEvent> {
    self.events.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::algo::AlgoId;
  use crate::models::order::{OrderSide, OrderType};

  fn request() -> OrderRequest {
    OrderRequest {
      order_id: OrderId::from("ALGO-000001"),
      algo_id: AlgoId::from("TWAP_1"),
      instrument: "XYZ".to_string(),
      side: OrderSide::Buy,
      order_type: OrderType::Limit,
      price: 10.0,
      quantity: 5.0,
      reference: "TWAP_1".to_string(),
      created_at: 0,
    }
  }

  #[tokio::test]
  async fn test_dry_run_acknowledges_and_cancels() {
    let mut gateway = DryRunGateway::new(16);
    let mut events = gateway.subscribe_events();

    let exchange_id = gateway.submit_order(request()).await.unwrap();
    match events.recv().await.unwrap() {
      GatewayEvent::Order(update) => {
        assert_eq!(update.order_id, exchange_id);
        assert_eq!(update.status, OrderStatus::Submitted);
      }
      other => panic!("unexpected event {:?}", other),
    }

    let cancel = CancelRequest {
      order_id: OrderId::from("ALGO-000001"),
      exchange_order_id: Some(exchange_id.clone()),
      instrument: "XYZ".to_string(),
    };
    gateway.cancel_order(cancel.clone()).await.unwrap();
    assert!(gateway.orders().is_empty());
    assert!(gateway.cancel_order(cancel).await.is_err());
  }
}
