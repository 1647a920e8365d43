use anyhow::Result as AnyResult;
use async_trait::async_trait;
use backup_application::FailedServiceRegistry;
use backup_application::handlers::{CheckEligibilityHandler, SendToInterfaceHandler};
use backup_application::ports::{DownstreamSender, InterfaceMessage, JobPolicy, SendError};
use backup_application::use_cases::{ReceiveBackupRequest, RecordReply};
use backup_domain::backup_request::{BackupReply, BackupRequest, BackupRequestStatus};
use backup_domain::error::{ConnectivityError, DomainResult};
use backup_domain::eventing::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, EventBus, RecoveryConfig,
    RecoveryScanner, ShutdownSignal, probe_fn,
};
use backup_domain::persist::{BackupRequestRepository, InMemoryBackupRequestRepository};
use chrono::{TimeDelta, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 可切换在线状态的下游接口；`job-bad` 总是被业务拒绝
#[derive(Default)]
struct FakeInterface {
    offline: AtomicBool,
    calls: Mutex<Vec<InterfaceMessage>>,
}

#[async_trait]
impl DownstreamSender for FakeInterface {
    async fn send(&self, message: &InterfaceMessage) -> Result<(), SendError> {
        self.calls.lock().unwrap().push(message.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(ConnectivityError::new("interface", "connection refused").into());
        }
        if message.job_id == "job-bad" {
            return Err(SendError::Business {
                reason: "unknown job".into(),
            });
        }
        Ok(())
    }
}

struct DenyBlocked;

#[async_trait]
impl JobPolicy for DenyBlocked {
    async fn is_allowed(&self, job_id: &str) -> DomainResult<bool> {
        Ok(job_id != "job-blocked")
    }
}

struct Harness {
    repo: Arc<InMemoryBackupRequestRepository>,
    bus: Arc<EventBus>,
    shutdown: ShutdownSignal,
    interface: Arc<FakeInterface>,
    breaker: CircuitBreaker,
    failed_services: Arc<FailedServiceRegistry>,
    receive: ReceiveBackupRequest,
}

impl Harness {
    fn start() -> Self {
        let repo = Arc::new(InMemoryBackupRequestRepository::new());
        let bus = Arc::new(EventBus::new());
        let shutdown = ShutdownSignal::new();
        let interface = Arc::new(FakeInterface::default());

        let probe = {
            let interface = interface.clone();
            probe_fn(move || {
                let interface = interface.clone();
                async move {
                    if interface.offline.load(Ordering::SeqCst) {
                        Err(ConnectivityError::new("interface", "still down"))
                    } else {
                        Ok(())
                    }
                }
            })
        };
        let config = CircuitBreakerConfig {
            success_to_close_count: 2,
            failure_to_open_count: 1,
            closed_retry_delay: Duration::from_millis(10),
            half_open_retry_delay: Duration::from_millis(20),
            open_alive_check_delay: Duration::from_millis(100),
            max_retry_attempts: 5,
        };
        let breaker = CircuitBreaker::start("interface", config, probe, bus.clone(), &shutdown);
        let failed_services = Arc::new(FailedServiceRegistry::new());

        bus.register(Arc::new(CheckEligibilityHandler::new(
            repo.clone(),
            Arc::new(DenyBlocked),
            bus.clone(),
        )));
        bus.register(Arc::new(SendToInterfaceHandler::new(
            repo.clone(),
            interface.clone(),
            breaker.clone(),
            failed_services.clone(),
            bus.clone(),
        )));
        let receive = ReceiveBackupRequest::new(repo.clone(), bus.clone());

        Self {
            repo,
            bus,
            shutdown,
            interface,
            breaker,
            failed_services,
            receive,
        }
    }

    async fn status(&self, id: &str) -> BackupRequestStatus {
        self.repo.load(id).await.unwrap().unwrap().status()
    }

    async fn stop(self) {
        self.shutdown.shutdown().await;
        self.bus.clear();
    }
}

#[tokio::test(start_paused = true)]
async fn healthy_interface_drives_request_to_replied() -> AnyResult<()> {
    let h = Harness::start();

    let id = h.receive.execute("job-1").await?;
    assert_eq!(h.status(&id).await, BackupRequestStatus::SentToInterface);

    let record = RecordReply::new(h.repo.clone(), h.bus.clone());
    record
        .execute(
            &id,
            BackupReply {
                succeeded: true,
                message: None,
            },
        )
        .await?;
    assert_eq!(h.status(&id).await, BackupRequestStatus::Replied);

    let calls = h.interface.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].attempt, 0);

    h.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn outage_defers_sends_until_interface_recovers() -> AnyResult<()> {
    let h = Harness::start();
    h.interface.offline.store(true, Ordering::SeqCst);

    let first = h.receive.execute("job-1").await?;
    assert_eq!(h.status(&first).await, BackupRequestStatus::Checked);
    assert_eq!(h.breaker.state(), CircuitBreakerState::Open);
    assert_eq!(h.failed_services.failing(), vec!["interface".to_string()]);

    // 断开期间不再调用下游
    let second = h.receive.execute("job-2").await?;
    assert_eq!(h.interface.calls.lock().unwrap().len(), 1);
    assert_eq!(h.breaker.status().queued_retries, 2);

    h.interface.offline.store(false, Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if h.status(&first).await == BackupRequestStatus::SentToInterface
                && h.status(&second).await == BackupRequestStatus::SentToInterface
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    assert_eq!(h.breaker.state(), CircuitBreakerState::Closed);
    assert!(h.failed_services.is_empty());
    let calls = h.interface.calls.lock().unwrap().clone();
    let redelivered: Vec<(&str, u32)> = calls[1..]
        .iter()
        .map(|m| (m.request_id.as_str(), m.attempt))
        .collect();
    assert_eq!(
        redelivered,
        vec![(first.as_str(), 1), (second.as_str(), 1)]
    );

    h.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn business_rejection_leaves_breaker_untouched() -> AnyResult<()> {
    let h = Harness::start();

    let id = h.receive.execute("job-bad").await?;

    let stored = h.repo.load(&id).await?.unwrap();
    assert_eq!(stored.status(), BackupRequestStatus::Rejected);
    assert_eq!(stored.rejection_reason(), Some("unknown job"));
    let status = h.breaker.status();
    assert_eq!(status.state, CircuitBreakerState::Closed);
    assert_eq!(status.failure_count, 0);
    assert_eq!(status.queued_retries, 0);
    assert!(h.failed_services.is_empty());

    h.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ineligible_job_is_never_sent() -> AnyResult<()> {
    let h = Harness::start();

    let id = h.receive.execute("job-blocked").await?;

    assert_eq!(h.status(&id).await, BackupRequestStatus::Rejected);
    assert!(h.interface.calls.lock().unwrap().is_empty());

    h.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn recovery_redrives_request_stuck_after_commit() -> AnyResult<()> {
    let h = Harness::start();

    // 模拟提交后、发布前崩溃：请求已落库，事件从未投递
    let mut stuck = BackupRequest::receive_at("stuck-1", "job-7", Utc::now() - TimeDelta::hours(1));
    h.repo.save(&mut stuck).await?;

    let scanner = RecoveryScanner::new(
        h.repo.clone(),
        h.bus.clone(),
        h.shutdown.clone(),
        RecoveryConfig {
            stale_after: Duration::from_secs(60),
            replay_delay: Duration::from_millis(10),
        },
    );
    let mut report = scanner.execute_stale().await;
    assert_eq!(report.total_replayed(), 1);
    assert_eq!(report.failures().count(), 0);

    let summary = report.take_replay().unwrap().join().await?;
    assert_eq!(summary.published, 1);
    assert_eq!(h.status("stuck-1").await, BackupRequestStatus::SentToInterface);

    // 再次重放同一合成事件不会重复发送
    let replayed = scanner.execute(Utc::now()).await;
    assert_eq!(replayed.total_replayed(), 0);
    assert_eq!(h.interface.calls.lock().unwrap().len(), 1);

    h.stop().await;
    Ok(())
}
