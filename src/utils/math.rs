//! 수량/가격 계산 유틸리티

/// 수량 비교 허용 오차
pub const QTY_EPSILON: f64 = 1e-9;

/// 수량 단위 반올림 (거래소 요구사항에 맞춰, 내림)
pub fn round_quantity(quantity: f64, step_size: f64) -> f64 {
  if step_size <= 0.0 {
    return quantity;
  }
  ((quantity + QTY_EPSILON) / step_size).floor() * step_size
}

/// 가중 평균 가격 갱신
///
/// `new_avg = (old_avg * old_qty + price * qty) / (old_qty + qty)`
pub fn weighted_average(old_avg: f64, old_qty: f64, price: f64, qty: f64) -> f64 {
  let total = old_qty + qty;
  if total <= 0.0 {
    return 0.0;
  }
  (old_avg * old_qty + price * qty) / total
}

/// a 가 b 이상인지 (오차 허용)
pub fn qty_reached(a: f64, b: f64) -> bool {
  a + QTY_EPSILON >= b
}

/// 0 에 가까운 수량인지
pub fn qty_is_zero(a: f64) -> bool {
  a.abs() <= QTY_EPSILON
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_round_quantity() {
    assert_eq!(round_quantity(1.23456, 0.01), 1.23);
    assert_eq!(round_quantity(20.0, 1.0), 20.0);
    assert_eq!(round_quantity(3.3, 0.0), 3.3);
  }

  #[test]
  fn test_weighted_average() {
    let avg = weighted_average(0.0, 0.0, 10.0, 5.0);
    assert_eq!(avg, 10.0);

    // (10*5 + 12*5) / 10 = 11
    let avg = weighted_average(avg, 5.0, 12.0, 5.0);
    assert!((avg - 11.0).abs() < 1e-12);
  }

  #[test]
  fn test_qty_compare() {
    assert!(qty_reached(100.0 - 1e-12, 100.0));
    assert!(!qty_reached(99.0, 100.0));
    assert!(qty_is_zero(1e-12));
  }
}
