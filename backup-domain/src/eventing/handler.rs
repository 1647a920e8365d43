//! 事件处理器（EventHandler）
//!
//! 定义消费某类/多类/全部事件的处理逻辑与元信息（名称、订阅种类）。
//!
use crate::domain_event::{DomainEvent, EventKind};
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub enum HandledEventKinds {
    One(EventKind),
    Many(Vec<EventKind>),
    All,
}

impl HandledEventKinds {
    pub fn kinds(&self) -> Vec<EventKind> {
        match self {
            HandledEventKinds::One(kind) => vec![*kind],
            HandledEventKinds::Many(kinds) => kinds.clone(),
            HandledEventKinds::All => EventKind::ALL.to_vec(),
        }
    }
}

/// 事件处理器：处理某一种类的事件
///
/// 处理器自行决定失败时的补偿方式（例如连通性故障时登记熔断器重试），
/// 总线只记录错误，不会重投。
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志与审计）
    fn handler_name(&self) -> &str;
    /// 返回该处理器订阅的事件种类
    fn handled_event_kinds(&self) -> HandledEventKinds;
    /// 处理事件
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}
