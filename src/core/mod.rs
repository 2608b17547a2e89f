//! 알고리즘 실행 엔진의 핵심 구현체

pub mod algo_instance;
pub mod engine;
pub mod event_bus;
pub mod service;
