//! 持久化协议（persist）
//!
//! 定义备份请求仓储接口与内存实现：
//! - `save` 在写入被确认后取走并返回聚合的待发布事件，由用例直接交给事件总线；
//! - `get_ids_by_status_before_timestamp` 供崩溃恢复扫描卡在中间状态的请求。
//!
//! 具体存储后端（如关系型数据库）由上层提供实现并注入。
//!
mod backup_request_repository;
mod inmemory;

pub use backup_request_repository::BackupRequestRepository;
pub use inmemory::InMemoryBackupRequestRepository;
