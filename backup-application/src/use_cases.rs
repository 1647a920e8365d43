//! 用例：修改聚合 → 持久化 → 确认写入后发布事件
use crate::error::AppError;
use backup_domain::backup_request::{BackupReply, BackupRequest};
use backup_domain::eventing::EventBus;
use backup_domain::persist::BackupRequestRepository;
use std::sync::Arc;
use tracing::{info, warn};
use ulid::Ulid;

/// 受理备份请求
pub struct ReceiveBackupRequest {
    repository: Arc<dyn BackupRequestRepository>,
    bus: Arc<EventBus>,
}

impl ReceiveBackupRequest {
    pub fn new(repository: Arc<dyn BackupRequestRepository>, bus: Arc<EventBus>) -> Self {
        Self { repository, bus }
    }

    /// 返回新请求的 ID
    pub async fn execute(&self, job_id: impl Into<String>) -> Result<String, AppError> {
        let id = Ulid::new().to_string();
        let mut request = BackupRequest::receive(id.clone(), job_id);
        let events = self.repository.save(&mut request).await?;
        info!(request_id = %id, job_id = request.job_id(), "backup request received");
        self.bus.publish_all(&events).await;
        Ok(id)
    }
}

/// 记录下游回复
///
/// 使用总线的两段式接口：保存前登记，写入确认后发布，写入失败则撤销登记。
pub struct RecordReply {
    repository: Arc<dyn BackupRequestRepository>,
    bus: Arc<EventBus>,
}

impl RecordReply {
    pub fn new(repository: Arc<dyn BackupRequestRepository>, bus: Arc<EventBus>) -> Self {
        Self { repository, bus }
    }

    pub async fn execute(&self, request_id: &str, reply: BackupReply) -> Result<(), AppError> {
        let mut request = self
            .repository
            .load(request_id)
            .await?
            .ok_or_else(|| AppError::RequestNotFound(request_id.to_string()))?;
        request.record_reply(reply)?;

        self.bus.mark_for_publish(&mut request);
        if let Err(err) = self.repository.save(&mut request).await {
            let dropped = self.bus.discard_pending(request_id);
            warn!(request_id, dropped = dropped.len(), error = %err, "reply not persisted");
            return Err(err.into());
        }
        self.bus.publish_pending_for_aggregate(request_id).await;
        Ok(())
    }
}
