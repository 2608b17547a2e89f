use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::AlgoError;
use crate::models::market_data::TickSnapshot;
use crate::models::order::{CancelRequest, OrderId, OrderRequest, OrderUpdate};
use crate::models::trade::Fill;

/// Events pushed by a gateway. Delivery is at-least-once and may be reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GatewayEvent {
    Tick(TickSnapshot),
    Order(OrderUpdate),
    Trade(Fill),
}

/// The `Gateway` trait defines the interface between the algorithm engine and a broker.
/// It will be implemented by real broker connectors and mock implementations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Submit a child order, returning the exchange order id
    async fn submit_order(&mut self, request: OrderRequest) -> Result<OrderId, AlgoError>;

    /// Cancel a child order. The outcome arrives later as an order event
    async fn cancel_order(&mut self, request: CancelRequest) -> Result<(), AlgoError>;

    /// Subscribe to market data for an instrument
    async fn subscribe(&mut self, instrument: &str) -> Result<(), AlgoError>;

    /// Receiver for ticks, order updates and fills
    fn subscribe_events(&self) -> broadcast::Receiver<GatewayEvent>;
}
