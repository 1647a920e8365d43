use crate::backup_request::{BackupRequest, BackupRequestStatus};
use crate::domain_event::DomainEvent;
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait BackupRequestRepository: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<BackupRequest>>;

    /// 持久化请求当前状态。
    ///
    /// 写入成功后取走并返回聚合上的待发布事件；写入失败时事件保留在聚合上。
    async fn save(&self, request: &mut BackupRequest) -> Result<Vec<DomainEvent>>;

    /// 查询当前处于 `status` 且进入该状态的时间早于 `before` 的请求 ID
    async fn get_ids_by_status_before_timestamp(
        &self,
        status: BackupRequestStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<String>>;
}

#[async_trait]
impl<T> BackupRequestRepository for Arc<T>
where
    T: BackupRequestRepository + ?Sized,
{
    async fn load(&self, id: &str) -> Result<Option<BackupRequest>> {
        (**self).load(id).await
    }

    async fn save(&self, request: &mut BackupRequest) -> Result<Vec<DomainEvent>> {
        (**self).save(request).await
    }

    async fn get_ids_by_status_before_timestamp(
        &self,
        status: BackupRequestStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        (**self)
            .get_ids_by_status_before_timestamp(status, before)
            .await
    }
}
