//! 延迟事件重放（DelayedEventRunner）
//!
//! 将一批事件按固定间隔逐个经事件总线投递，避免刚恢复的依赖被瞬时洪峰再次压垮。
//! `run_events` 消费自身，同一实例只能运行一次；收到关闭信号后立即停止，
//! 剩余事件被丢弃，已投递的事件不回滚。
//!
use super::{EventBus, ShutdownSignal};
use crate::domain_event::DomainEvent;
use crate::error::{DomainError, DomainResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct DelayedEventRunner {
    bus: Arc<EventBus>,
    shutdown: ShutdownSignal,
    delay: Duration,
    pending: VecDeque<DomainEvent>,
}

/// 一次重放的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub published: usize,
    pub discarded: usize,
}

/// 重放任务句柄；丢弃句柄不会中止任务
#[derive(Debug)]
pub struct ReplayHandle {
    inner: JoinHandle<ReplaySummary>,
}

impl ReplayHandle {
    pub async fn join(self) -> DomainResult<ReplaySummary> {
        self.inner
            .await
            .map_err(|e| DomainError::event_bus(format!("replay task failed: {e}")))
    }
}

impl DelayedEventRunner {
    pub fn new(bus: Arc<EventBus>, shutdown: ShutdownSignal, delay: Duration) -> Self {
        Self {
            bus,
            shutdown,
            delay,
            pending: VecDeque::new(),
        }
    }

    pub fn add_event(&mut self, event: DomainEvent) {
        self.pending.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 启动独立的后台重放任务，调用方无需等待
    pub fn run_events(self) -> ReplayHandle {
        let shutdown = self.shutdown.clone();
        ReplayHandle {
            inner: shutdown.spawn(self.run()),
        }
    }

    async fn run(mut self) -> ReplaySummary {
        let total = self.pending.len();
        let mut published = 0;
        debug!(total, delay = ?self.delay, "replay started");

        while !self.shutdown.is_triggered() {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            self.bus.publish_to_subscribers(&event).await;
            published += 1;

            if !self.pending.is_empty() && self.shutdown.sleep(self.delay).await.is_cancelled() {
                break;
            }
        }

        let discarded = self.pending.len();
        if discarded > 0 {
            warn!(published, discarded, "replay stopped by shutdown; remaining events discarded");
        } else {
            info!(published, "replay finished");
        }
        ReplaySummary {
            published,
            discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::EventKind;
    use crate::eventing::{EventHandler, HandledEventKinds};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Instant)>>,
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
            self.seen
                .lock()
                .unwrap()
                .push((event.aggregate_id().to_string(), Instant::now()));
            Ok(())
        }
    }

    fn runner_with(n: usize, delay: Duration) -> (DelayedEventRunner, Arc<Recorder>, ShutdownSignal) {
        let bus = Arc::new(EventBus::new());
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());
        let shutdown = ShutdownSignal::new();
        let mut runner = DelayedEventRunner::new(bus, shutdown.clone(), delay);
        for i in 0..n {
            runner.add_event(DomainEvent::synthetic(EventKind::RequestReceived, format!("req-{i}")));
        }
        (runner, recorder, shutdown)
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_in_order_with_fixed_spacing() {
        let (runner, recorder, _sd) = runner_with(3, Duration::from_millis(200));
        assert_eq!(runner.len(), 3);

        let summary = runner.run_events().join().await.unwrap();
        assert_eq!(
            summary,
            ReplaySummary {
                published: 3,
                discarded: 0
            }
        );

        let seen = recorder.seen.lock().unwrap().clone();
        let ids: Vec<&str> = seen.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["req-0", "req-1", "req-2"]);
        for pair in seen.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_run_stops_further_publishes() {
        let (runner, recorder, shutdown) = runner_with(5, Duration::from_secs(1));
        let handle = runner.run_events();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown.trigger();
        let summary = handle.join().await.unwrap();

        assert_eq!(summary.published, 2);
        assert_eq!(summary.discarded, 3);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn already_triggered_signal_publishes_nothing() {
        let (runner, recorder, shutdown) = runner_with(2, Duration::from_millis(1));
        shutdown.trigger();
        let summary = runner.run_events().join().await.unwrap();
        assert_eq!(summary.published, 0);
        assert_eq!(summary.discarded, 2);
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
