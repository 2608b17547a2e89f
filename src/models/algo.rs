use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::AlgoError;
use crate::models::order::OrderSide;
use crate::strategies::TemplateKind;

/// 알고리즘 인스턴스 ID (예: `TWAP_1`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlgoId(pub String);

impl fmt::Display for AlgoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AlgoId {
    fn from(id: &str) -> Self {
        AlgoId(id.to_string())
    }
}

/// 알고리즘 실행 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AlgoStatus {
    Created,
    Running,
    Paused,
    Stopped,
    Finished,
}

impl AlgoStatus {
    /// 종료 상태 (더 이상 주문 불가)
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlgoStatus::Stopped | AlgoStatus::Finished)
    }
}

impl fmt::Display for AlgoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlgoStatus::Created => "Created",
            AlgoStatus::Running => "Running",
            AlgoStatus::Paused => "Paused",
            AlgoStatus::Stopped => "Stopped",
            AlgoStatus::Finished => "Finished",
        };
        write!(f, "{}", s)
    }
}

/// 템플릿 파라미터 (이름 → 값)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgoParams(pub Map<String, Value>);

impl AlgoParams {
    pub fn new() -> Self {
        AlgoParams(Map::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// 숫자 파라미터 조회. 문자열 숫자도 허용 (CSV 입력)
    pub fn get_f64(&self, name: &str) -> Result<Option<f64>, AlgoError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| {
                AlgoError::ConfigError(format!("parameter '{}' is not a finite number", name))
            }),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                AlgoError::ConfigError(format!("parameter '{}' is not a number: {}", name, s))
            }),
            Some(other) => Err(AlgoError::ConfigError(format!(
                "parameter '{}' has unsupported value: {}",
                name, other
            ))),
        }
    }

    pub fn require_f64(&self, name: &str) -> Result<f64, AlgoError> {
        self.get_f64(name)?
            .ok_or_else(|| AlgoError::ConfigError(format!("missing parameter '{}'", name)))
    }

    /// 음이 아닌 정수 파라미터 조회
    pub fn get_u64(&self, name: &str) -> Result<Option<u64>, AlgoError> {
        match self.get_f64(name)? {
            None => Ok(None),
            Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(Some(v as u64)),
            Some(v) => Err(AlgoError::ConfigError(format!(
                "parameter '{}' must be a non-negative integer, got {}",
                name, v
            ))),
        }
    }

    pub fn require_u64(&self, name: &str) -> Result<u64, AlgoError> {
        self.get_u64(name)?
            .ok_or_else(|| AlgoError::ConfigError(format!("missing parameter '{}'", name)))
    }
}

/// 알고리즘 시작 요청 (운영자/배치 입력 공통)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub template: TemplateKind,
    pub instrument: String,
    pub side: OrderSide,
    #[serde(default)]
    pub price: Option<f64>,
    pub quantity: f64,
    #[serde(default)]
    pub params: AlgoParams,
}

impl StartRequest {
    pub fn new(
        template: TemplateKind,
        instrument: impl Into<String>,
        side: OrderSide,
        quantity: f64,
    ) -> Self {
        StartRequest {
            template,
            instrument: instrument.into(),
            side,
            price: None,
            quantity,
            params: AlgoParams::new(),
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_params(mut self, params: AlgoParams) -> Self {
        self.params = params;
        self
    }
}

/// 상태 조회 결과 / 업데이트 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgoSnapshot {
    pub algo_id: AlgoId,
    pub template: TemplateKind,
    pub instrument: String,
    pub side: OrderSide,
    pub price: Option<f64>,
    pub quantity: f64,
    pub traded: f64,
    pub left: f64,
    pub traded_price: f64,
    pub status: AlgoStatus,
    pub parameters: AlgoParams,
    pub variables: Value,
    pub active_orders: usize,
    pub created_at: DateTime<Utc>,
}
