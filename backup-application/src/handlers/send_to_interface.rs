use super::load_in_status;
use crate::failed_services::FailedServiceRegistry;
use crate::ports::{DownstreamSender, InterfaceMessage, SendError};
use async_trait::async_trait;
use backup_domain::backup_request::BackupRequestStatus;
use backup_domain::domain_event::{DomainEvent, EventKind};
use backup_domain::eventing::{
    CircuitBreaker, EventBus, EventHandler, HandledEventKinds, RetryDisposition,
};
use backup_domain::persist::BackupRequestRepository;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 发送至下游接口：`RequestChecked` → `SentToInterface`
///
/// - 熔断器断开时不调用下游，直接把事件放入重试队列；
/// - 连通性故障：熔断器记失败，事件进入重试队列，依赖登记为故障；
/// - 业务拒绝：请求转为 `Rejected`，不影响熔断器；
/// - 成功：熔断器记成功，清理已恢复的故障依赖。
pub struct SendToInterfaceHandler {
    repository: Arc<dyn BackupRequestRepository>,
    sender: Arc<dyn DownstreamSender>,
    breaker: CircuitBreaker,
    failed_services: Arc<FailedServiceRegistry>,
    bus: Arc<EventBus>,
}

impl SendToInterfaceHandler {
    pub fn new(
        repository: Arc<dyn BackupRequestRepository>,
        sender: Arc<dyn DownstreamSender>,
        breaker: CircuitBreaker,
        failed_services: Arc<FailedServiceRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            sender,
            breaker,
            failed_services,
            bus,
        }
    }

    fn defer(&self, event: &DomainEvent) {
        self.failed_services.register(&self.breaker);
        match self
            .failed_services
            .enqueue_retry(self.breaker.name(), event.clone())
        {
            Some(RetryDisposition::Queued) => {
                debug!(request_id = event.aggregate_id(), "send deferred to retry queue")
            }
            Some(RetryDisposition::DeadLettered(ev)) => error!(
                request_id = ev.aggregate_id(),
                attempts = ev.retry_count(),
                "send abandoned after retries"
            ),
            Some(RetryDisposition::Discarded) | None => {
                warn!(request_id = event.aggregate_id(), "send dropped, interface halted")
            }
        }
    }
}

#[async_trait]
impl EventHandler for SendToInterfaceHandler {
    fn handler_name(&self) -> &str {
        "send_to_interface"
    }

    fn handled_event_kinds(&self) -> HandledEventKinds {
        HandledEventKinds::One(EventKind::RequestChecked)
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let Some(mut request) =
            load_in_status(self.repository.as_ref(), event, BackupRequestStatus::Checked).await?
        else {
            return Ok(());
        };

        if !self.breaker.is_connected() {
            self.defer(event);
            return Ok(());
        }

        let message = InterfaceMessage::for_request(&request, event.retry_count());
        match self.sender.send(&message).await {
            Ok(()) => {
                self.breaker.on_success();
                self.failed_services.prune_recovered();
                request.mark_sent()?;
            }
            Err(SendError::Connectivity(err)) => {
                warn!(
                    request_id = event.aggregate_id(),
                    dependency = %err.dependency,
                    error = %err,
                    "interface unreachable"
                );
                self.breaker.on_failure();
                self.defer(event);
                return Ok(());
            }
            Err(SendError::Business { reason }) => {
                info!(request_id = event.aggregate_id(), %reason, "interface rejected request");
                request.reject(reason)?;
            }
        }

        let events = self.repository.save(&mut request).await?;
        self.bus.publish_all(&events).await;
        Ok(())
    }
}
