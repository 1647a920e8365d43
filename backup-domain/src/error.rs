//! 领域层统一错误定义
//!
//! 聚焦事件系统、仓储查询、状态校验与配置校验等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
//! 外部依赖不可达（连通性故障）单独建模为 `ConnectivityError`：
//! 它只驱动熔断器记账与重试，不应作为硬失败暴露给最终用户。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 事件系统 ---
    #[error("event bus error: {reason}")]
    EventBus { reason: String },

    // --- 仓储/持久化 ---
    #[error("repository error: {reason}")]
    Repository { reason: String },
    #[error("storage query failed: status={status}, reason={reason}")]
    StorageQuery { status: String, reason: String },

    // --- 领域规则/状态 ---
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    // --- 配置 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
}

impl DomainError {
    pub fn event_bus(reason: impl Into<String>) -> Self {
        Self::EventBus {
            reason: reason.into(),
        }
    }

    pub fn repository(reason: impl Into<String>) -> Self {
        Self::Repository {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

/// 外部依赖不可达（网络中断、对端宕机、超时等）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency unreachable: dependency={dependency}, reason={reason}")]
pub struct ConnectivityError {
    pub dependency: String,
    pub reason: String,
}

impl ConnectivityError {
    pub fn new(dependency: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            reason: reason.into(),
        }
    }
}
