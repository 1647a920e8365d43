//! 应用配置
//!
//! 从 TOML 文件加载，路径由环境变量 `BACKUP_CONFIG` 指定；未设置时使用默认值。
//! 缺省字段取默认值，时长字段以毫秒表示：
//!
//! ```toml
//! [interface]
//! failure_to_open_count = 3
//! open_alive_check_delay_ms = 5000
//!
//! [recovery]
//! stale_after_ms = 60000
//! ```
use crate::error::AppError;
use backup_domain::eventing::{CircuitBreakerConfig, RecoveryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 下游接口熔断器
    pub interface: CircuitBreakerConfig,
    pub recovery: RecoveryConfig,
}

impl AppConfig {
    pub const PATH_ENV: &'static str = "BACKUP_CONFIG";

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let config: Self = toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_env() -> Result<Self, AppError> {
        match std::env::var_os(Self::PATH_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.interface.validate()?;
        self.recovery.validate()?;
        Ok(())
    }
}
