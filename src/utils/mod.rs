//! 공용 유틸리티
//!
//! 로깅, 수량 계산, 시간 함수 제공

pub mod logging;
pub mod math;

use chrono::Utc;

/// 현재 시간을 타임스탬프(밀리초)로 반환
pub fn current_timestamp_ms() -> i64 {
  Utc::now().timestamp_millis()
}
