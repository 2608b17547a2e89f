use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::AlgoError;
use crate::gateway::traits::{Gateway, GatewayEvent};
use crate::models::order::{CancelRequest, OrderId, OrderRequest};

/// A recording implementation of the Gateway trait for testing and development.
///
/// Every request is kept in submission order. Events are injected with [`MockGateway::emit`].
pub struct MockGateway {
    events: broadcast::Sender<GatewayEvent>,
    submitted: Vec<(OrderId, OrderRequest)>,
    cancels: Vec<CancelRequest>,
    subscriptions: Vec<String>,
    reject_orders: bool,
    order_id_counter: u64,
}

impl MockGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            events,
            submitted: Vec::new(),
            cancels: Vec::new(),
            subscriptions: Vec::new(),
            reject_orders: false,
            order_id_counter: 0,
        }
    }

    /// Make every following submission fail synchronously
    pub fn set_reject_orders(&mut self, reject: bool) {
        self.reject_orders = reject;
    }

    /// Publish an event to every subscriber
    pub fn emit(&self, event: GatewayEvent) {
        let _ = self.events.send(event);
    }

    /// Accepted submissions as (exchange id, request)
    pub fn submitted(&self) -> &[(OrderId, OrderRequest)] {
        &self.submitted
    }

    pub fn cancels(&self) -> &[CancelRequest] {
        &self.cancels
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    fn generate_order_id(&mut self) -> OrderId {
        self.order_id_counter += 1;
        OrderId(format!("mock-{}", self.order_id_counter))
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn submit_order(&mut self, request: OrderRequest) -> Result<OrderId, AlgoError> {
        if self.reject_orders {
            return Err(AlgoError::GatewayRejected(format!(
                "mock gateway rejected {}",
                request.order_id
            )));
        }

        let order_id = self.generate_order_id();
        self.submitted.push((order_id.clone(), request));
        Ok(order_id)
    }

    async fn cancel_order(&mut self, request: CancelRequest) -> Result<(), AlgoError> {
        self.cancels.push(request);
        Ok(())
    }

    async fn subscribe(&mut self, instrument: &str) -> Result<(), AlgoError> {
        self.subscriptions.push(instrument.to_string());
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }
}
