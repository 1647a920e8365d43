use super::EventKind;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 不可变的领域事件记录
///
/// 重试时不修改原事件，而是通过 [`DomainEvent::next_attempt`] 产生一份
/// `retry_count + 1` 的副本（事件 ID 保持不变，便于下游幂等去重）。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct DomainEvent {
    /// 事件唯一标识符
    #[builder(default = ulid::Ulid::new().to_string())]
    event_id: String,
    /// 事件种类
    kind: EventKind,
    /// 聚合 ID，标识事件所属的聚合根实例
    aggregate_id: String,
    /// 事件发生时间
    #[builder(default = Utc::now())]
    occurred_at: DateTime<Utc>,
    /// 已重试次数
    #[builder(default)]
    retry_count: u32,
    /// 事件载荷
    #[builder(default)]
    payload: Value,
}

impl DomainEvent {
    pub fn new(kind: EventKind, aggregate_id: impl Into<String>, payload: Value) -> Self {
        Self::builder()
            .kind(kind)
            .aggregate_id(aggregate_id.into())
            .payload(payload)
            .build()
    }

    /// 仅携带聚合 ID 的合成事件（崩溃恢复使用）。
    ///
    /// 处理器必须从存储重新读取聚合的当前状态，不能依赖载荷。
    pub fn synthetic(kind: EventKind, aggregate_id: impl Into<String>) -> Self {
        Self::new(kind, aggregate_id, Value::Null)
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is_synthetic(&self) -> bool {
        self.payload.is_null()
    }

    /// 生成下一次重试使用的副本
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        }
    }
}
