use crate::domain_event::DomainEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
    /// 终态：收到关闭信号后进入，不再离开
    Halted,
}

impl CircuitBreakerState {
    /// 除 `Open` 外均视为可连通
    pub fn is_connected(&self) -> bool {
        !matches!(self, CircuitBreakerState::Open)
    }
}

/// 一次状态流转
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: CircuitBreakerState,
    pub to: CircuitBreakerState,
    pub at: DateTime<Utc>,
}

/// 只读状态快照（用于观测）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitBreakerState,
    pub success_count: u32,
    pub failure_count: u32,
    pub queued_retries: usize,
    pub dead_lettered: usize,
}

/// `add_retry_event` 的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDisposition {
    /// 已进入重试队列
    Queued,
    /// 超过最大重试次数，转入死信
    DeadLettered(DomainEvent),
    /// 熔断器已停止，事件被丢弃
    Discarded,
}
