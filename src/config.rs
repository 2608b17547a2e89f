/**
* filename : config
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AlgoError;

/// Environment prefix, e.g. `XALGO__ENGINE__MAX_RUNNING_PER_INSTRUMENT=3`
pub const ENV_PREFIX: &str = "XALGO";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 종목당 동시 실행(Running) 가능한 알고리즘 수
    pub max_running_per_instrument: usize,
    /// 타이머 이벤트 주기 (밀리초)
    pub timer_interval_ms: u64,
    /// 이벤트 큐 / 브로드캐스트 버퍼 크기
    pub event_buffer: usize,
    /// 실행 중 오류 발생 시 해당 인스턴스 강제 중지 여부
    pub stop_on_error: bool,
    /// 하위 주문 최소 수량
    pub min_order_size: f64,
    /// 하위 주문 최대 수량 (None = 제한 없음)
    pub max_order_size: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub name: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Load configuration from `config.{toml,json,yaml}` (optional) and `XALGO__*` env vars
    pub fn load() -> Result<Self, AlgoError> {
        Self::load_from("config")
    }

    /// Load configuration from the given file stem (extension optional)
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AlgoError> {
        let name = path.as_ref().to_string_lossy().to_string();

        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(&name).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), AlgoError> {
        if self.engine.max_running_per_instrument == 0 {
            return Err(AlgoError::ConfigError(
                "engine.max_running_per_instrument must be greater than 0".to_string(),
            ));
        }
        if self.engine.timer_interval_ms == 0 {
            return Err(AlgoError::ConfigError(
                "engine.timer_interval_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(max) = self.engine.max_order_size {
            if max < self.engine.min_order_size {
                return Err(AlgoError::ConfigError(format!(
                    "engine.max_order_size ({}) is below engine.min_order_size ({})",
                    max, self.engine.min_order_size
                )));
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_running_per_instrument: 5,
            timer_interval_ms: 1000,
            event_buffer: 1024,
            stop_on_error: true,
            min_order_size: 0.0,
            max_order_size: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            name: "DryRun".to_string(),
            dry_run: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}
