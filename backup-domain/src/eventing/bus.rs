//! 进程内事件总线（EventBus）
//!
//! 以显式实例（而非全局静态）承载订阅表与待发布聚合登记表，
//! 在进程启动时构造一次并通过 `Arc` 注入生产者与订阅者：
//! - `subscribe`/`register`：按事件种类登记处理器，同一种类按登记顺序串行执行；
//! - `publish_all`：用例在持久化确认后直接发布仓储返回的事件；
//! - `mark_for_publish` + `publish_pending_for_aggregate`：先登记、后发布的两段式接口；
//! - `publish_to_subscribers`：绕过登记表的底层投递，供重试与重放路径使用。
//!
//! 注意：登记表只在内存中，登记与发布之间崩溃会丢失事件，
//! 由 `RecoveryScanner` 基于持久化状态补偿。
//!
use super::EventHandler;
use crate::aggregate::Aggregate;
use crate::domain_event::{DomainEvent, EventKind};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
pub struct EventBus {
    handlers: DashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
    marked: DashMap<String, Vec<DomainEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某一事件种类登记处理器
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        debug!(kind = %kind, handler = handler.handler_name(), "subscribe");
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// 按处理器自身声明的订阅种类登记
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        for kind in handler.handled_event_kinds().kinds() {
            self.subscribe(kind, handler.clone());
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, |list| list.len())
    }

    /// 登记聚合的待发布事件（取走聚合上的事件）。
    ///
    /// 幂等：同一聚合重复登记只会追加新产生的事件，已登记的事件不会重复。
    /// 没有待发布事件的聚合不会被登记。返回该聚合当前登记的事件数。
    pub fn mark_for_publish<A: Aggregate>(&self, aggregate: &mut A) -> usize {
        let events = aggregate.take_pending_events();
        if events.is_empty() {
            return self.marked.get(aggregate.id()).map_or(0, |entry| entry.len());
        }
        let mut entry = self.marked.entry(aggregate.id().to_string()).or_default();
        entry.extend(events);
        entry.len()
    }

    pub fn is_marked(&self, aggregate_id: &str) -> bool {
        self.marked.contains_key(aggregate_id)
    }

    /// 撤销登记（例如持久化失败），返回被丢弃的事件
    pub fn discard_pending(&self, aggregate_id: &str) -> Vec<DomainEvent> {
        self.marked
            .remove(aggregate_id)
            .map(|(_, events)| events)
            .unwrap_or_default()
    }

    /// 发布已登记聚合的全部事件，随后移除登记；未登记时为空操作。
    ///
    /// 只能在持久化写入被确认之后调用。返回发布的事件数。
    pub async fn publish_pending_for_aggregate(&self, aggregate_id: &str) -> usize {
        let Some((_, events)) = self.marked.remove(aggregate_id) else {
            return 0;
        };
        self.publish_all(&events).await;
        events.len()
    }

    /// 依次发布一批事件
    pub async fn publish_all(&self, events: &[DomainEvent]) {
        for event in events {
            self.publish_to_subscribers(event).await;
        }
    }

    /// 直接投递给该种类的全部订阅者（按登记顺序串行），返回调用的处理器数。
    ///
    /// 处理器失败只记录日志，不影响后续处理器。
    pub async fn publish_to_subscribers(&self, event: &DomainEvent) -> usize {
        // 先克隆出处理器列表，避免跨 await 持有 DashMap 的读锁
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .get(&event.kind())
            .map(|list| list.clone())
            .unwrap_or_default();

        for handler in &handlers {
            if let Err(err) = handler.handle(event).await {
                warn!(
                    handler = handler.handler_name(),
                    event_id = event.event_id(),
                    kind = %event.kind(),
                    aggregate_id = event.aggregate_id(),
                    error = %err,
                    "event handler failed"
                );
            }
        }
        handlers.len()
    }

    /// 清空订阅表与登记表（进程关闭或测试隔离）
    pub fn clear(&self) {
        self.handlers.clear();
        self.marked.clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.handlers.len())
            .field("marked", &self.marked.len())
            .finish()
    }
}
