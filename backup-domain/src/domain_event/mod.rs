//! 领域事件（Domain Event）
//!
//! 定义事件种类的封闭枚举（`EventKind`）与不可变的事件记录（`DomainEvent`）。
//! 事件在聚合的状态变更方法中产生，暂存在聚合上，待持久化确认后再发布。

mod event;
mod event_kind;

pub use event::DomainEvent;
pub use event_kind::EventKind;
