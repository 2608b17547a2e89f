//! 로깅 유틸리티
//!
//! 로그 초기화 및 알고리즘 실행 로그 함수 제공

use env_logger::Builder;
use log::LevelFilter;
use std::env;

use crate::error::AlgoError;
use crate::models::algo::AlgoId;
use crate::models::order::{OrderId, OrderRequest};

/// 로그 레벨 문자열 파싱 (알 수 없는 값은 info)
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// 로깅 시스템 초기화
///
/// `RUST_LOG` 가 설정되어 있으면 설정 파일의 레벨보다 우선한다.
pub fn init(default_level: &str) -> Result<(), AlgoError> {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());

    Builder::new()
        .filter_level(parse_level(&log_level))
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| AlgoError::ConfigError(format!("Failed to initialise logger: {}", e)))?;

    log::info!("로깅 시스템 초기화 완료: 레벨 = {}", log_level);

    Ok(())
}

/// 알고리즘 로그 (인스턴스 ID 접두어)
pub fn log_algo(algo_id: &AlgoId, msg: &str) {
    log::info!("{}: {}", algo_id, msg);
}

/// 하위 주문 제출 로그
pub fn log_order_submitted(request: &OrderRequest) {
    log::info!(
        "{}: 주문 제출 {} - 종목: {} - 방향: {} - 수량: {} - 가격: {}",
        request.algo_id,
        request.order_id,
        request.instrument,
        request.side,
        request.quantity,
        request.price
    );
}

/// 주문 취소 로그
pub fn log_order_cancelled(algo_id: &AlgoId, order_id: &OrderId) {
    log::info!("{}: 주문 취소 요청 {}", algo_id, order_id);
}

/// 주문 체결 로그
pub fn log_fill(algo_id: &AlgoId, order_id: &OrderId, quantity: f64, price: f64, traded: f64) {
    log::info!(
        "{}: 체결 {} - 수량: {} - 가격: {} - 누적: {}",
        algo_id,
        order_id,
        quantity,
        price,
        traded
    );
}

/// 오류 로그
pub fn log_error(context: &str, error: &AlgoError) {
    log::error!("오류 발생 - {} [{}]: {}", context, error.kind(), error);
}
