//! 熔断器（CircuitBreaker）
//!
//! 每个外部依赖一个实例，负责：
//! - 记录调用成败，按阈值在 `Closed`/`Open`/`HalfOpen` 之间流转；
//! - `Open` 时周期性探活，恢复后进入 `HalfOpen`；
//! - 缓存因连通性故障失败的事件，恢复后按节奏经事件总线重投；
//! - 收到关闭信号后进入终态 `Halted`，丢弃重试队列。
//!
//! 熔断器只报告状态，不拦截调用：调用方需在 `is_connected() == false` 时快速失败。
//!
mod breaker;
mod config;
mod probe;
mod state;

pub use breaker::CircuitBreaker;
pub use config::CircuitBreakerConfig;
pub use probe::{FnProbe, HealthProbe, probe_fn};
pub use state::{CircuitBreakerState, CircuitBreakerStatus, RetryDisposition, StateTransition};
