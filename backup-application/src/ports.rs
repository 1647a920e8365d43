//! 外部协作方接口
//!
//! 下游发送失败必须区分连通性故障与业务拒绝：
//! 前者驱动熔断器记账与重试，后者绝不触发熔断器。
use async_trait::async_trait;
use backup_domain::aggregate::Aggregate;
use backup_domain::backup_request::BackupRequest;
use backup_domain::error::{ConnectivityError, DomainResult};
use serde::Serialize;
use thiserror::Error;

/// 发往下游接口的备份指令
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceMessage {
    pub request_id: String,
    pub job_id: String,
    /// 第几次重试（首次发送为 0）
    pub attempt: u32,
}

impl InterfaceMessage {
    pub fn for_request(request: &BackupRequest, attempt: u32) -> Self {
        Self {
            request_id: request.id().to_string(),
            job_id: request.job_id().to_string(),
            attempt,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
    #[error("rejected by interface: {reason}")]
    Business { reason: String },
}

#[async_trait]
pub trait DownstreamSender: Send + Sync {
    async fn send(&self, message: &InterfaceMessage) -> Result<(), SendError>;
}

/// 作业是否允许备份（业务规则由外部提供）
#[async_trait]
pub trait JobPolicy: Send + Sync {
    async fn is_allowed(&self, job_id: &str) -> DomainResult<bool>;
}
