//! 事件子系统（eventing）
//!
//! 提供进程内的事件投递与韧性协调：
//! - `EventBus`：显式注入的发布/订阅注册表，支持先提交后发布；
//! - `CircuitBreaker`：按依赖维度的健康状态机与重试队列；
//! - `DelayedEventRunner`：按固定间隔、可取消地重放一批事件；
//! - `RecoveryScanner`：启动时重新驱动卡在中间状态的请求；
//! - `ShutdownSignal`：共享的取消上下文，统一停止全部后台循环。
//!
//! 仅在单进程内协调，不提供跨实例的重试队列或选主。
//!
pub mod bus;
pub mod circuit_breaker;
pub mod handler;
pub mod recovery;
pub mod runner;
pub mod shutdown;

pub use bus::EventBus;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitBreakerStatus, FnProbe,
    HealthProbe, RetryDisposition, StateTransition, probe_fn,
};
pub use handler::{EventHandler, HandledEventKinds};
pub use recovery::{RecoveryConfig, RecoveryReport, RecoveryScanner};
pub use runner::{DelayedEventRunner, ReplayHandle, ReplaySummary};
pub use shutdown::{ShutdownSignal, Sleep};
