//! 崩溃恢复扫描（RecoveryScanner）
//!
//! 事件总线的发布步骤不持久化：状态已提交但事件尚未投递时进程崩溃，
//! 请求就会卡在中间状态。启动时按持久化状态找出这些请求，
//! 为每个请求合成只携带聚合 ID 的事件，交给一个 `DelayedEventRunner` 按节奏重放。
//!
//! 各状态分类独立查询，某一分类查询失败只在报告中体现，不影响其他分类。
//!
use super::runner::{DelayedEventRunner, ReplayHandle};
use super::{EventBus, ShutdownSignal};
use crate::backup_request::BackupRequestStatus;
use crate::domain_event::{DomainEvent, EventKind};
use crate::error::{DomainError, DomainResult};
use crate::persist::BackupRequestRepository;
use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 恢复配置
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// 进入中间状态超过该时长视为卡住
    #[serde(rename = "stale_after_ms", with = "crate::serde_millis")]
    pub stale_after: Duration,
    /// 重放两个事件之间的间隔
    #[serde(rename = "replay_delay_ms", with = "crate::serde_millis")]
    pub replay_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(60),
            replay_delay: Duration::from_millis(500),
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> DomainResult<()> {
        if TimeDelta::from_std(self.stale_after).is_err() {
            return Err(DomainError::invalid_config("stale_after_ms is out of range"));
        }
        if self.replay_delay.is_zero() {
            return Err(DomainError::invalid_config("replay_delay_ms must be > 0"));
        }
        Ok(())
    }
}

/// 一次恢复扫描的结果：按状态分类给出合成事件或查询错误
#[derive(Debug)]
pub struct RecoveryReport {
    categories: BTreeMap<BackupRequestStatus, DomainResult<Vec<DomainEvent>>>,
    replay: Option<ReplayHandle>,
}

impl RecoveryReport {
    pub fn category(&self, status: BackupRequestStatus) -> Option<&DomainResult<Vec<DomainEvent>>> {
        self.categories.get(&status)
    }

    pub fn categories(
        &self,
    ) -> impl Iterator<Item = (BackupRequestStatus, &DomainResult<Vec<DomainEvent>>)> {
        self.categories.iter().map(|(status, result)| (*status, result))
    }

    /// 全部分类合成的事件总数
    pub fn total_replayed(&self) -> usize {
        self.categories
            .values()
            .filter_map(|r| r.as_ref().ok())
            .map(Vec::len)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (BackupRequestStatus, &DomainError)> {
        self.categories
            .iter()
            .filter_map(|(status, r)| r.as_ref().err().map(|e| (*status, e)))
    }

    /// 取出后台重放任务句柄（没有可重放的事件时为 None）
    pub fn take_replay(&mut self) -> Option<ReplayHandle> {
        self.replay.take()
    }
}

pub struct RecoveryScanner<R> {
    repository: Arc<R>,
    bus: Arc<EventBus>,
    shutdown: ShutdownSignal,
    config: RecoveryConfig,
}

impl<R> RecoveryScanner<R>
where
    R: BackupRequestRepository,
{
    pub fn new(
        repository: Arc<R>,
        bus: Arc<EventBus>,
        shutdown: ShutdownSignal,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            repository,
            bus,
            shutdown,
            config,
        }
    }

    /// 以“当前时间 - stale_after”为界执行一次恢复
    pub async fn execute_stale(&self) -> RecoveryReport {
        self.execute(self.stale_cutoff(Utc::now())).await
    }

    /// 超出时间可表示范围时取最早时刻，此时没有请求会被视为卡住
    fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.config.stale_after)
            .ok()
            .and_then(|stale_after| now.checked_sub_signed(stale_after))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// 为进入中间状态早于 `before` 的请求合成事件，并启动一次延迟重放
    pub async fn execute(&self, before: DateTime<Utc>) -> RecoveryReport {
        let scans = BackupRequestStatus::RECOVERABLE
            .iter()
            .map(|&(status, kind)| async move { (status, self.scan(status, kind, before).await) });
        let categories: BTreeMap<_, _> = join_all(scans).await.into_iter().collect();

        let mut runner =
            DelayedEventRunner::new(self.bus.clone(), self.shutdown.clone(), self.config.replay_delay);
        for (status, result) in &categories {
            match result {
                Ok(events) => {
                    info!(%status, count = events.len(), %before, "stale requests found");
                    for event in events {
                        runner.add_event(event.clone());
                    }
                }
                Err(err) => error!(%status, error = %err, "recovery query failed"),
            }
        }

        let replay = (!runner.is_empty()).then(|| runner.run_events());
        RecoveryReport { categories, replay }
    }

    async fn scan(
        &self,
        status: BackupRequestStatus,
        kind: EventKind,
        before: DateTime<Utc>,
    ) -> DomainResult<Vec<DomainEvent>> {
        let ids = self
            .repository
            .get_ids_by_status_before_timestamp(status, before)
            .await
            .map_err(|err| DomainError::StorageQuery {
                status: status.to_string(),
                reason: err.to_string(),
            })?;

        Ok(ids
            .into_iter()
            .map(|id| DomainEvent::synthetic(kind, id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup_request::BackupRequest;
    use crate::eventing::{EventHandler, HandledEventKinds};
    use crate::persist::InMemoryBackupRequestRepository;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn handler_name(&self) -> &str {
            "recorder"
        }
        fn handled_event_kinds(&self) -> HandledEventKinds {
            HandledEventKinds::All
        }
        async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn config() -> RecoveryConfig {
        RecoveryConfig {
            stale_after: Duration::from_secs(60),
            replay_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn replays_only_requests_older_than_cutoff() {
        let repo = Arc::new(InMemoryBackupRequestRepository::new());
        let now = Utc::now();
        let cutoff = now - TimeDelta::minutes(5);
        for (id, age) in [("stale-1", 30), ("stale-2", 10), ("fresh", 1)] {
            let mut req = BackupRequest::receive_at(id, "job", now - TimeDelta::minutes(age));
            repo.save(&mut req).await.unwrap();
        }
        let bus = Arc::new(EventBus::new());
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());
        let scanner = RecoveryScanner::new(repo, bus, ShutdownSignal::new(), config());

        let mut report = scanner.execute(cutoff).await;

        let received = report
            .category(BackupRequestStatus::Received)
            .unwrap()
            .as_ref()
            .unwrap();
        let ids: Vec<&str> = received.iter().map(|e| e.aggregate_id()).collect();
        assert_eq!(ids, vec!["stale-1", "stale-2"]);
        assert!(received.iter().all(|e| e.is_synthetic() && e.kind() == EventKind::RequestReceived));
        assert!(
            report
                .category(BackupRequestStatus::Checked)
                .unwrap()
                .as_ref()
                .unwrap()
                .is_empty()
        );
        assert_eq!(report.total_replayed(), 2);

        let summary = report.take_replay().unwrap().join().await.unwrap();
        assert_eq!(summary.published, 2);
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }

    /// 对 Checked 分类的查询总是失败
    struct FlakyStorage {
        inner: InMemoryBackupRequestRepository,
    }

    #[async_trait]
    impl BackupRequestRepository for FlakyStorage {
        async fn load(&self, id: &str) -> DomainResult<Option<BackupRequest>> {
            self.inner.load(id).await
        }
        async fn save(&self, request: &mut BackupRequest) -> DomainResult<Vec<DomainEvent>> {
            self.inner.save(request).await
        }
        async fn get_ids_by_status_before_timestamp(
            &self,
            status: BackupRequestStatus,
            before: DateTime<Utc>,
        ) -> DomainResult<Vec<String>> {
            if status == BackupRequestStatus::Checked {
                return Err(DomainError::repository("connection reset"));
            }
            self.inner.get_ids_by_status_before_timestamp(status, before).await
        }
    }

    #[tokio::test]
    async fn failing_category_does_not_block_siblings() {
        let repo = Arc::new(FlakyStorage {
            inner: InMemoryBackupRequestRepository::new(),
        });
        let old = Utc::now() - TimeDelta::hours(1);
        let mut req = BackupRequest::receive_at("stale", "job", old);
        repo.save(&mut req).await.unwrap();

        let scanner = RecoveryScanner::new(
            repo,
            Arc::new(EventBus::new()),
            ShutdownSignal::new(),
            config(),
        );
        let report = scanner.execute_stale().await;

        assert_eq!(report.total_replayed(), 1);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        match failures[0] {
            (BackupRequestStatus::Checked, DomainError::StorageQuery { status, reason }) => {
                assert_eq!(status, "checked");
                assert!(reason.contains("connection reset"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stale_after_beyond_time_range_is_rejected() {
        let cfg = RecoveryConfig {
            stale_after: Duration::from_millis(u64::MAX),
            ..config()
        };
        match cfg.validate().unwrap_err() {
            DomainError::InvalidConfig { reason } => assert!(reason.contains("stale_after_ms")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_stale_after_never_replays_fresh_requests() {
        for millis in [9_000_000_000_000_000, u64::MAX] {
            let repo = Arc::new(InMemoryBackupRequestRepository::new());
            let mut req = BackupRequest::receive("fresh", "job");
            repo.save(&mut req).await.unwrap();
            let cfg = RecoveryConfig {
                stale_after: Duration::from_millis(millis),
                ..config()
            };
            let scanner = RecoveryScanner::new(repo, Arc::new(EventBus::new()), ShutdownSignal::new(), cfg);

            let mut report = scanner.execute_stale().await;
            assert_eq!(report.total_replayed(), 0, "stale_after = {millis}ms");
            assert!(report.take_replay().is_none());
        }
    }

    #[tokio::test]
    async fn nothing_stale_starts_no_replay() {
        let repo = Arc::new(InMemoryBackupRequestRepository::new());
        let mut req = BackupRequest::receive("fresh", "job");
        repo.save(&mut req).await.unwrap();
        let scanner = RecoveryScanner::new(repo, Arc::new(EventBus::new()), ShutdownSignal::new(), config());

        let mut report = scanner.execute_stale().await;
        assert_eq!(report.total_replayed(), 0);
        assert!(report.take_replay().is_none());
        assert_eq!(report.categories().count(), 2);
    }
}
