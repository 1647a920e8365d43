//! 事件订阅者
//!
//! 订阅者收到的事件可能是重试或崩溃恢复合成的（只携带聚合 ID），
//! 因此一律从仓储重新读取请求当前状态；状态已向前推进时直接跳过，
//! 同一事件被投递多次也只会生效一次。
mod check_eligibility;
mod send_to_interface;

pub use check_eligibility::CheckEligibilityHandler;
pub use send_to_interface::SendToInterfaceHandler;

use backup_domain::backup_request::{BackupRequest, BackupRequestStatus};
use backup_domain::domain_event::DomainEvent;
use backup_domain::persist::BackupRequestRepository;
use tracing::{debug, warn};

/// 读取事件对应的请求；请求不存在或不处于 `expected` 状态时返回 None
async fn load_in_status(
    repository: &dyn BackupRequestRepository,
    event: &DomainEvent,
    expected: BackupRequestStatus,
) -> anyhow::Result<Option<BackupRequest>> {
    let Some(request) = repository.load(event.aggregate_id()).await? else {
        warn!(
            aggregate_id = event.aggregate_id(),
            kind = %event.kind(),
            "backup request not found, event ignored"
        );
        return Ok(None);
    };
    if request.status() != expected {
        debug!(
            aggregate_id = event.aggregate_id(),
            status = %request.status(),
            %expected,
            "request already moved on, event skipped"
        );
        return Ok(None);
    }
    Ok(Some(request))
}
