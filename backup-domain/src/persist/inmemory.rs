//! 内存版备份请求仓储
//!
//! 基于 `DashMap` 的轻量实现，典型用途：测试环境、示例与本地开发。

use super::BackupRequestRepository;
use crate::aggregate::Aggregate;
use crate::backup_request::{BackupRequest, BackupRequestStatus};
use crate::domain_event::DomainEvent;
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InMemoryBackupRequestRepository {
    rows: DashMap<String, BackupRequest>,
}

impl InMemoryBackupRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl BackupRequestRepository for InMemoryBackupRequestRepository {
    async fn load(&self, id: &str) -> Result<Option<BackupRequest>> {
        Ok(self.rows.get(id).map(|row| row.value().clone()))
    }

    async fn save(&self, request: &mut BackupRequest) -> Result<Vec<DomainEvent>> {
        let events = request.take_pending_events();
        self.rows.insert(request.id().to_string(), request.clone());
        Ok(events)
    }

    async fn get_ids_by_status_before_timestamp(
        &self,
        status: BackupRequestStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut matches: Vec<(DateTime<Utc>, String)> = self
            .rows
            .iter()
            .filter(|row| row.status() == status && row.status_changed_at() < before)
            .map(|row| (row.status_changed_at(), row.key().clone()))
            .collect();
        // 按进入状态的先后排序，保证重放顺序稳定
        matches.sort();
        Ok(matches.into_iter().map(|(_, id)| id).collect())
    }
}
