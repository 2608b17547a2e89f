//! 도메인 모델

pub mod algo;
pub mod market_data;
pub mod order;
pub mod trade;
