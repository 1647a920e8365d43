use super::load_in_status;
use crate::ports::JobPolicy;
use async_trait::async_trait;
use backup_domain::backup_request::BackupRequestStatus;
use backup_domain::domain_event::{DomainEvent, EventKind};
use backup_domain::eventing::{EventBus, EventHandler, HandledEventKinds};
use backup_domain::persist::BackupRequestRepository;
use std::sync::Arc;
use tracing::info;

/// 资格校验：`RequestReceived` → `Checked` 或 `Rejected`
pub struct CheckEligibilityHandler {
    repository: Arc<dyn BackupRequestRepository>,
    policy: Arc<dyn JobPolicy>,
    bus: Arc<EventBus>,
}

impl CheckEligibilityHandler {
    pub fn new(
        repository: Arc<dyn BackupRequestRepository>,
        policy: Arc<dyn JobPolicy>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            policy,
            bus,
        }
    }
}

#[async_trait]
impl EventHandler for CheckEligibilityHandler {
    fn handler_name(&self) -> &str {
        "check_eligibility"
    }

    fn handled_event_kinds(&self) -> HandledEventKinds {
        HandledEventKinds::One(EventKind::RequestReceived)
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let Some(mut request) =
            load_in_status(self.repository.as_ref(), event, BackupRequestStatus::Received).await?
        else {
            return Ok(());
        };

        if self.policy.is_allowed(request.job_id()).await? {
            request.mark_checked()?;
        } else {
            info!(request_id = event.aggregate_id(), job_id = request.job_id(), "job not eligible");
            request.reject("job is not eligible for backup")?;
        }

        let events = self.repository.save(&mut request).await?;
        self.bus.publish_all(&events).await;
        Ok(())
    }
}
