use crate::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 熔断器配置
///
/// 配置文件中时长以毫秒表示（`*_ms`）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// `HalfOpen` 下连续成功多少次后闭合
    pub success_to_close_count: u32,
    /// `Closed` 下累计失败多少次后断开
    pub failure_to_open_count: u32,
    /// `Closed` 下重投两个重试事件之间的间隔
    #[serde(rename = "closed_retry_delay_ms", with = "crate::serde_millis")]
    pub closed_retry_delay: Duration,
    /// `HalfOpen` 下重投两个重试事件之间的间隔
    #[serde(rename = "half_open_retry_delay_ms", with = "crate::serde_millis")]
    pub half_open_retry_delay: Duration,
    /// `Open` 下两次探活之间的间隔
    #[serde(rename = "open_alive_check_delay_ms", with = "crate::serde_millis")]
    pub open_alive_check_delay: Duration,
    /// 单个事件最多重试次数，超过后转入死信
    pub max_retry_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            success_to_close_count: 2,
            failure_to_open_count: 3,
            closed_retry_delay: Duration::from_millis(500),
            half_open_retry_delay: Duration::from_secs(2),
            open_alive_check_delay: Duration::from_secs(5),
            max_retry_attempts: 5,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> DomainResult<()> {
        let counts = [
            ("success_to_close_count", self.success_to_close_count),
            ("failure_to_open_count", self.failure_to_open_count),
            ("max_retry_attempts", self.max_retry_attempts),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(DomainError::invalid_config(format!("{name} must be > 0")));
        }
        // Closed 下的重投也消耗重试次数，需保证事件耗尽次数前熔断器已断开
        if self.max_retry_attempts < self.failure_to_open_count {
            return Err(DomainError::invalid_config(format!(
                "max_retry_attempts ({}) must be >= failure_to_open_count ({})",
                self.max_retry_attempts, self.failure_to_open_count
            )));
        }

        let delays = [
            ("closed_retry_delay_ms", self.closed_retry_delay),
            ("half_open_retry_delay_ms", self.half_open_retry_delay),
            ("open_alive_check_delay_ms", self.open_alive_check_delay),
        ];
        if let Some((name, _)) = delays.iter().find(|(_, d)| d.is_zero()) {
            return Err(DomainError::invalid_config(format!("{name} must be > 0")));
        }
        Ok(())
    }
}
