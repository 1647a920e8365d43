//! 聚合（Aggregate）抽象
//!
//! 聚合在一次用例执行期间累积待发布的领域事件：
//! - 状态变更方法负责记录事件（不发布）；
//! - 持久化确认后由调用方取走事件并交给事件总线发布（先提交、后发布）。
//!
use crate::domain_event::DomainEvent;

/// 聚合根接口
pub trait Aggregate: Send + Sync {
    /// 聚合标识
    fn id(&self) -> &str;

    /// 尚未发布的事件（按产生顺序）
    fn pending_events(&self) -> &[DomainEvent];

    /// 取走全部待发布事件，聚合上的列表随之清空
    fn take_pending_events(&mut self) -> Vec<DomainEvent>;

    fn has_pending_events(&self) -> bool {
        !self.pending_events().is_empty()
    }
}
