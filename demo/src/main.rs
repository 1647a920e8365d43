use async_trait::async_trait;
use backup_application::AppConfig;
use backup_application::FailedServiceRegistry;
use backup_application::handlers::{CheckEligibilityHandler, SendToInterfaceHandler};
use backup_application::ports::{DownstreamSender, InterfaceMessage, JobPolicy, SendError};
use backup_application::use_cases::{ReceiveBackupRequest, RecordReply};
use backup_domain::backup_request::{BackupReply, BackupRequest, BackupRequestStatus};
use backup_domain::error::{ConnectivityError, DomainResult};
use backup_domain::eventing::{
    CircuitBreaker, EventBus, RecoveryScanner, ShutdownSignal, probe_fn,
};
use backup_domain::persist::{BackupRequestRepository, InMemoryBackupRequestRepository};
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 启动后前若干秒不可达的下游接口
struct FlappingInterface {
    down_until: Instant,
}

impl FlappingInterface {
    fn is_up(&self) -> bool {
        Instant::now() >= self.down_until
    }
}

#[async_trait]
impl DownstreamSender for FlappingInterface {
    async fn send(&self, message: &InterfaceMessage) -> Result<(), SendError> {
        if !self.is_up() {
            return Err(ConnectivityError::new("interface", "connection refused").into());
        }
        if message.job_id.starts_with("legacy-") {
            return Err(SendError::Business {
                reason: format!("job {} is not registered", message.job_id),
            });
        }
        info!(request_id = %message.request_id, attempt = message.attempt, "interface accepted backup");
        Ok(())
    }
}

struct DenyList(Vec<&'static str>);

#[async_trait]
impl JobPolicy for DenyList {
    async fn is_allowed(&self, job_id: &str) -> DomainResult<bool> {
        Ok(!self.0.contains(&job_id))
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("BACKUP_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env()?;
    info!(?config, "configuration loaded");

    let repo = Arc::new(InMemoryBackupRequestRepository::new());
    let bus = Arc::new(EventBus::new());
    let shutdown = ShutdownSignal::new();
    let interface = Arc::new(FlappingInterface {
        down_until: Instant::now() + Duration::from_secs(8),
    });

    let probe = {
        let interface = interface.clone();
        probe_fn(move || {
            let up = interface.is_up();
            async move {
                if up {
                    Ok(())
                } else {
                    Err(ConnectivityError::new("interface", "health check refused"))
                }
            }
        })
    };
    let breaker = CircuitBreaker::start("interface", config.interface, probe, bus.clone(), &shutdown);
    let failed_services = Arc::new(FailedServiceRegistry::new());

    bus.register(Arc::new(CheckEligibilityHandler::new(
        repo.clone(),
        Arc::new(DenyList(vec!["job-archived"])),
        bus.clone(),
    )));
    bus.register(Arc::new(SendToInterfaceHandler::new(
        repo.clone(),
        interface.clone(),
        breaker.clone(),
        failed_services.clone(),
        bus.clone(),
    )));

    // 上次运行遗留：已落库但事件未发布
    let mut orphan = BackupRequest::receive_at("orphan-1", "job-nightly", Utc::now() - TimeDelta::hours(2));
    repo.save(&mut orphan).await?;

    let scanner = RecoveryScanner::new(repo.clone(), bus.clone(), shutdown.clone(), config.recovery);
    let mut report = scanner.execute_stale().await;
    for (status, err) in report.failures() {
        warn!(%status, error = %err, "recovery category failed");
    }
    info!(replayed = report.total_replayed(), "recovery scan finished");
    let replay = report.take_replay();

    let receive = ReceiveBackupRequest::new(repo.clone(), bus.clone());
    let mut ids = Vec::new();
    for job in ["job-db", "job-files", "job-archived", "legacy-mail"] {
        ids.push(receive.execute(job).await?);
    }
    if let Some(replay) = replay {
        let summary = replay.join().await?;
        info!(published = summary.published, discarded = summary.discarded, "recovery replay done");
    }
    ids.push("orphan-1".to_string());

    info!("waiting for the interface to recover, press ctrl-c to stop early");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(15)) => {}
    }

    let record = RecordReply::new(repo.clone(), bus.clone());
    for id in &ids {
        let Some(request) = repo.load(id).await? else {
            continue;
        };
        if request.status() == BackupRequestStatus::SentToInterface {
            let reply = BackupReply {
                succeeded: true,
                message: Some("snapshot stored".into()),
            };
            record.execute(id, reply).await?;
        }
        let request = repo.load(id).await?;
        if let Some(request) = request {
            info!(
                request_id = %id,
                job_id = request.job_id(),
                status = %request.status(),
                reason = request.rejection_reason().unwrap_or("-"),
                "final status"
            );
        }
    }
    info!(status = ?breaker.status(), failing = ?failed_services.failing(), "interface breaker");

    shutdown.shutdown().await;
    bus.clear();
    Ok(())
}
