//! 备份编排领域层（backup-domain）
//!
//! 备份请求经由领域事件驱动，依次经历“受理 → 校验 → 发送至接口 → 回复”。
//! 本 crate 提供：
//! - 备份请求聚合（`backup_request`）与聚合抽象（`aggregate`）
//! - 领域事件（`domain_event`）：封闭的事件种类与不可变事件记录
//! - 持久化协议（`persist`）及内存实现
//! - 事件子系统（`eventing`）：事件总线、熔断器与重试队列、延迟重放、崩溃恢复
//!
//! 典型用法：
//! 1. 进程启动时构造一个 `EventBus`、一个 `ShutdownSignal`，并为每个外部依赖启动一个 `CircuitBreaker`；
//! 2. 用例修改聚合 → 仓储保存（返回待发布事件）→ 交给总线发布；
//! 3. 订阅者遇到连通性故障时调用 `on_failure` 并通过 `add_retry_event` 登记重试；
//! 4. 启动时执行一次 `RecoveryScanner`，补偿崩溃导致的漏发布。
//!
pub mod aggregate;
pub mod backup_request;
pub mod domain_event;
pub mod error;
#[cfg(feature = "eventing")]
pub mod eventing;
pub mod persist;

#[cfg(feature = "eventing")]
mod serde_millis;
