//! 알고리즘 주문 실행 엔진 라이브러리
//!
//! 대량 주문을 TWAP, Iceberg, Sniper, BestLimit 전략으로 분할 실행하고
//! 하위 주문 체결을 추적하는 실행 엔진입니다.

pub mod api;
pub mod batch;
pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod models;
pub mod order_core;
pub mod strategies;
pub mod utils;

// 핵심 타입 재노출
pub use crate::core::engine::AlgoEngine;
pub use crate::core::service::{EngineCommand, EngineEvent, EngineHandle};
pub use crate::error::AlgoError;
pub use crate::gateway::traits::{Gateway, GatewayEvent};
pub use crate::models::algo::{AlgoId, AlgoParams, AlgoSnapshot, AlgoStatus, StartRequest};
pub use crate::models::market_data::TickSnapshot;
pub use crate::models::order::{OrderId, OrderSide, OrderStatus, OrderUpdate};
pub use crate::models::trade::Fill;
pub use crate::strategies::{AlgoAction, AlgoTemplate, TemplateKind};

/// 버전 정보
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 결과 타입 별칭
pub type Result<T> = std::result::Result<T, AlgoError>;
