/**
* filename : error
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use thiserror::Error;

use crate::models::algo::{AlgoId, AlgoStatus};
use crate::models::order::OrderId;

#[derive(Error, Debug)]
pub enum AlgoError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid state transition: cannot {command} {algo_id} while {status}")]
    InvalidStateTransition {
        algo_id: AlgoId,
        status: AlgoStatus,
        command: &'static str,
    },

    #[error("Capacity exceeded: {instrument} already has {limit} running algorithms")]
    CapacityExceeded { instrument: String, limit: usize },

    #[error("Gateway rejected: {0}")]
    GatewayRejected(String),

    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    #[error("Algorithm not found: {0}")]
    AlgoNotFound(AlgoId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Engine stopped")]
    EngineStopped,

    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl AlgoError {
    /// API 응답/로그용 오류 종류
    pub fn kind(&self) -> &'static str {
        match self {
            AlgoError::ConfigError(_) => "ConfigError",
            AlgoError::InvalidStateTransition { .. } => "InvalidStateTransition",
            AlgoError::CapacityExceeded { .. } => "CapacityExceeded",
            AlgoError::GatewayRejected(_) => "GatewayRejected",
            AlgoError::LedgerInconsistency(_) => "LedgerInconsistency",
            AlgoError::AlgoNotFound(_) => "AlgoNotFound",
            AlgoError::OrderNotFound(_) => "OrderNotFound",
            AlgoError::UnknownTemplate(_) => "UnknownTemplate",
            AlgoError::GatewayError(_) => "GatewayError",
            AlgoError::InvalidOrder(_) => "InvalidOrder",
            AlgoError::EngineStopped => "EngineStopped",
            AlgoError::Settings(_) => "Settings",
            AlgoError::IoError(_) => "IoError",
            AlgoError::SerializationError(_) => "SerializationError",
            AlgoError::CsvError(_) => "CsvError",
            AlgoError::ParseError(_) => "ParseError",
        }
    }
}
