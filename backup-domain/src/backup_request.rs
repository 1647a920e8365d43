//! 备份请求聚合（BackupRequest）
//!
//! 状态流转：`Received → Checked → SentToInterface → Replied`，
//! 校验失败或下游业务拒绝时进入终态 `Rejected`。
//! 每次状态变更都会刷新 `status_changed_at` 并记录对应的领域事件，
//! 崩溃恢复依据该时间戳判断请求是否卡在中间状态。
//!
use crate::aggregate::Aggregate;
use crate::domain_event::{DomainEvent, EventKind};
use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupRequestStatus {
    Received,
    Checked,
    SentToInterface,
    Replied,
    Rejected,
}

impl BackupRequestStatus {
    /// 需要崩溃恢复重新驱动的中间状态，及其对应的重放事件种类
    pub const RECOVERABLE: [(BackupRequestStatus, EventKind); 2] = [
        (BackupRequestStatus::Received, EventKind::RequestReceived),
        (BackupRequestStatus::Checked, EventKind::RequestChecked),
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            BackupRequestStatus::Received => "received",
            BackupRequestStatus::Checked => "checked",
            BackupRequestStatus::SentToInterface => "sent_to_interface",
            BackupRequestStatus::Replied => "replied",
            BackupRequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackupRequestStatus::Replied | BackupRequestStatus::Rejected
        )
    }

    /// 处于该状态的请求在恢复时应重放的事件种类
    pub fn recovery_event_kind(&self) -> Option<EventKind> {
        Self::RECOVERABLE
            .iter()
            .find(|(status, _)| status == self)
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for BackupRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 下游接口对一次备份的回复
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReply {
    pub succeeded: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRequest {
    id: String,
    job_id: String,
    status: BackupRequestStatus,
    status_changed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    rejection_reason: Option<String>,
    reply: Option<BackupReply>,
    #[serde(skip)]
    pending_events: Vec<DomainEvent>,
}

impl BackupRequest {
    /// 受理一条新的备份请求，记录 `RequestReceived`
    pub fn receive(id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self::receive_at(id, job_id, Utc::now())
    }

    /// 以指定受理时间创建请求（导入历史数据时使用）
    pub fn receive_at(
        id: impl Into<String>,
        job_id: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let mut request = Self {
            id: id.into(),
            job_id: job_id.into(),
            status: BackupRequestStatus::Received,
            status_changed_at: received_at,
            created_at: received_at,
            rejection_reason: None,
            reply: None,
            pending_events: Vec::new(),
        };
        let payload = json!({ "job_id": request.job_id });
        request.record(EventKind::RequestReceived, payload);
        request
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> BackupRequestStatus {
        self.status
    }

    pub fn status_changed_at(&self) -> DateTime<Utc> {
        self.status_changed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn reply(&self) -> Option<&BackupReply> {
        self.reply.as_ref()
    }

    /// 资格校验通过
    pub fn mark_checked(&mut self) -> DomainResult<()> {
        self.ensure(BackupRequestStatus::Received, "mark checked")?;
        self.move_to(BackupRequestStatus::Checked);
        let payload = json!({ "job_id": self.job_id });
        self.record(EventKind::RequestChecked, payload);
        Ok(())
    }

    /// 已发送至下游接口
    pub fn mark_sent(&mut self) -> DomainResult<()> {
        self.ensure(BackupRequestStatus::Checked, "mark sent")?;
        self.move_to(BackupRequestStatus::SentToInterface);
        let payload = json!({ "job_id": self.job_id });
        self.record(EventKind::RequestSent, payload);
        Ok(())
    }

    /// 记录下游回复
    pub fn record_reply(&mut self, reply: BackupReply) -> DomainResult<()> {
        self.ensure(BackupRequestStatus::SentToInterface, "record reply")?;
        self.move_to(BackupRequestStatus::Replied);
        let payload = json!({
            "job_id": self.job_id,
            "succeeded": reply.succeeded,
            "message": reply.message,
        });
        self.reply = Some(reply);
        self.record(EventKind::ReplyReceived, payload);
        Ok(())
    }

    /// 业务拒绝（资格不符或下游业务错误），仅允许在发送之前
    pub fn reject(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        match self.status {
            BackupRequestStatus::Received | BackupRequestStatus::Checked => {
                self.move_to(BackupRequestStatus::Rejected);
                self.rejection_reason = Some(reason.into());
                Ok(())
            }
            other => Err(DomainError::invalid_state(format!(
                "cannot reject request {} in status {other}",
                self.id
            ))),
        }
    }

    fn ensure(&self, expected: BackupRequestStatus, action: &str) -> DomainResult<()> {
        if self.status == expected {
            return Ok(());
        }
        Err(DomainError::invalid_state(format!(
            "cannot {action} request {}: expected status {expected}, found {}",
            self.id, self.status
        )))
    }

    fn move_to(&mut self, status: BackupRequestStatus) {
        self.status = status;
        self.status_changed_at = Utc::now();
    }

    fn record(&mut self, kind: EventKind, payload: serde_json::Value) {
        let event = DomainEvent::builder()
            .kind(kind)
            .aggregate_id(self.id.clone())
            .occurred_at(self.status_changed_at)
            .payload(payload)
            .build();
        self.pending_events.push(event);
    }
}

impl Aggregate for BackupRequest {
    fn id(&self) -> &str {
        &self.id
    }

    fn pending_events(&self) -> &[DomainEvent] {
        &self.pending_events
    }

    fn take_pending_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }
}
