//! 备份编排应用层（backup-application）
//!
//! 在领域层之上编排用例与事件订阅者：
//! - `use_cases`：受理备份请求、记录下游回复（修改 → 保存 → 提交后发布）；
//! - `handlers`：资格校验与发送至下游接口的事件订阅者，负责连通性/业务错误分类；
//! - `failed_services`：当前故障依赖的登记表；
//! - `ports`：下游发送与作业策略等外部协作方接口；
//! - `config`：TOML 配置加载。
pub mod config;
pub mod error;
pub mod failed_services;
pub mod handlers;
pub mod ports;
pub mod use_cases;

pub use config::AppConfig;
pub use error::AppError;
pub use failed_services::FailedServiceRegistry;
