/**
* filename : event_bus
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::core::service::EngineEvent;
use crate::gateway::traits::GatewayEvent;

impl From<GatewayEvent> for EngineEvent {
  fn from(event: GatewayEvent) -> Self {
    match event {
      GatewayEvent::Tick(tick) => EngineEvent::Tick(tick),
      GatewayEvent::Order(update) => EngineEvent::Order(update),
      GatewayEvent::Trade(fill) => EngineEvent::Trade(fill),
    }
  }
}

/// 게이트웨이 브로드캐스트를 엔진 이벤트 큐로 전달
///
/// 게이트웨이 채널이 닫히거나 엔진 큐가 닫히면 종료된다.
pub fn spawn_event_bus(
  mut receiver: broadcast::Receiver<GatewayEvent>,
  sender: mpsc::Sender<EngineEvent>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      match receiver.recv().await {
        Ok(event) => {
          if sender.send(event.into()).await.is_err() {
            log::debug!("엔진 이벤트 큐 종료, 이벤트 버스 중지");
            break;
          }
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          log::warn!("게이트웨이 이벤트 {}건 유실 (수신 지연)", skipped);
        }
        Err(broadcast::error::RecvError::Closed) => {
          log::info!("게이트웨이 이벤트 채널 종료");
          break;
        }
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::market_data::TickSnapshot;
  use crate::models::order::{OrderStatus, OrderUpdate};

  #[tokio::test]
  async fn test_events_are_forwarded_in_order() {
    let (gateway_tx, gateway_rx) = broadcast::channel(16);
    let (engine_tx, mut engine_rx) = mpsc::channel(16);
    let task = spawn_event_bus(gateway_rx, engine_tx);

    gateway_tx.send(GatewayEvent::Tick(TickSnapshot::new("XYZ", 1.0, 1.1, 1.05, 0))).unwrap();
    gateway_tx
      .send(GatewayEvent::Order(OrderUpdate::new("X1", OrderStatus::Submitted, 0.0)))
      .unwrap();
    drop(gateway_tx);

    assert!(matches!(engine_rx.recv().await, Some(EngineEvent::Tick(_))));
    assert!(matches!(engine_rx.recv().await, Some(EngineEvent::Order(_))));
    task.await.unwrap();
    assert!(engine_rx.recv().await.is_none());
  }
}
