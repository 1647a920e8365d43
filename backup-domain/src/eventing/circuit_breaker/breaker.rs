use super::{
    CircuitBreakerConfig, CircuitBreakerState, CircuitBreakerStatus, HealthProbe,
    RetryDisposition, StateTransition,
};
use crate::domain_event::DomainEvent;
use crate::eventing::{EventBus, ShutdownSignal, Sleep};
use chrono::Utc;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, warn};

use CircuitBreakerState::{Closed, HalfOpen, Halted, Open};

const TRANSITION_CAPACITY: usize = 64;

/// 熔断器句柄，克隆后共享同一实例
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: CircuitBreakerConfig,
    core: Mutex<Core>,
    wake: Notify,
    probe: Arc<dyn HealthProbe>,
    bus: Arc<EventBus>,
    // 进程关闭信号的子信号，`halt` 只取消本实例
    signal: ShutdownSignal,
    transitions: broadcast::Sender<StateTransition>,
}

#[derive(Debug, Default)]
struct Core {
    state: CircuitBreakerState,
    success_count: u32,
    failure_count: u32,
    retry_queue: VecDeque<DomainEvent>,
    dead_letters: Vec<DomainEvent>,
}

/// 监督任务下一步要做的事
enum Step {
    Exit,
    Probe,
    Drain,
    Idle,
}

impl CircuitBreaker {
    /// 创建熔断器并启动其监督任务（需在 tokio 运行时内调用）
    pub fn start(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        probe: impl HealthProbe + 'static,
        bus: Arc<EventBus>,
        shutdown: &ShutdownSignal,
    ) -> Self {
        let (transitions, _rx) = broadcast::channel(TRANSITION_CAPACITY);
        let inner = Arc::new(Inner {
            name: name.into(),
            config,
            core: Mutex::new(Core::default()),
            wake: Notify::new(),
            probe: Arc::new(probe),
            bus,
            signal: shutdown.child(),
            transitions,
        });

        info!(breaker = %inner.name, ?config, "circuit breaker started");
        shutdown.spawn(inner.clone().supervise());
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().state
    }

    /// 除 `Open` 外均为 true；调用方应在 false 时快速失败
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// 记录一次成功调用
    pub fn on_success(&self) {
        let inner = &self.inner;
        let mut core = inner.lock();
        match core.state {
            Closed => core.failure_count = 0,
            HalfOpen => {
                core.success_count = core.success_count.saturating_add(1);
                if core.success_count >= inner.config.success_to_close_count {
                    core.failure_count = 0;
                    inner.transition(&mut core, Closed);
                }
            }
            Open | Halted => {}
        }
    }

    /// 记录一次连通性失败
    ///
    /// `HalfOpen` 下任意一次失败立即重新断开并恢复探活。
    pub fn on_failure(&self) {
        let inner = &self.inner;
        let mut core = inner.lock();
        match core.state {
            Closed => {
                core.failure_count = core.failure_count.saturating_add(1);
                if core.failure_count >= inner.config.failure_to_open_count {
                    core.success_count = 0;
                    inner.transition(&mut core, Open);
                }
            }
            HalfOpen => {
                core.failure_count = core.failure_count.saturating_add(1);
                core.success_count = 0;
                inner.transition(&mut core, Open);
            }
            Open | Halted => {}
        }
    }

    /// 登记一个需在依赖恢复后重投的事件（重试次数 +1）
    pub fn add_retry_event(&self, event: DomainEvent) -> RetryDisposition {
        let inner = &self.inner;
        let mut core = inner.lock();
        if core.state == Halted {
            debug!(breaker = %inner.name, event_id = event.event_id(), "halted; retry event discarded");
            return RetryDisposition::Discarded;
        }

        let event = event.next_attempt();
        if event.retry_count() > inner.config.max_retry_attempts {
            error!(
                breaker = %inner.name,
                event_id = event.event_id(),
                kind = %event.kind(),
                aggregate_id = event.aggregate_id(),
                retry_count = event.retry_count(),
                "retry attempts exhausted; event dead-lettered"
            );
            core.dead_letters.push(event.clone());
            return RetryDisposition::DeadLettered(event);
        }

        debug!(
            breaker = %inner.name,
            event_id = event.event_id(),
            retry_count = event.retry_count(),
            queued = core.retry_queue.len() + 1,
            "retry event queued"
        );
        core.retry_queue.push_back(event);
        drop(core);
        inner.wake.notify_one();
        RetryDisposition::Queued
    }

    /// 进入终态并丢弃重试队列；重复调用为空操作
    pub fn halt(&self) {
        self.inner.halt();
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let core = self.inner.lock();
        CircuitBreakerStatus {
            name: self.inner.name.clone(),
            state: core.state,
            success_count: core.success_count,
            failure_count: core.failure_count,
            queued_retries: core.retry_queue.len(),
            dead_lettered: core.dead_letters.len(),
        }
    }

    /// 超过最大重试次数的事件
    pub fn dead_letters(&self) -> Vec<DomainEvent> {
        self.inner.lock().dead_letters.clone()
    }

    /// 订阅状态流转（订阅之后发生的流转）
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.inner.transitions.subscribe()
    }

    /// 以 'static 事件流形式订阅状态流转，落后丢失的记录会被跳过
    pub fn transitions(&self) -> BoxStream<'static, StateTransition> {
        let stream = BroadcastStream::new(self.subscribe_transitions())
            .filter_map(|item| async move { item.ok() });
        Box::pin(stream)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("status", &self.status())
            .finish()
    }
}

impl Inner {
    // 状态变更本身不会失败，锁中毒时直接沿用内部数据
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, core: &mut Core, to: CircuitBreakerState) {
        let from = core.state;
        if from == to || from == Halted {
            return;
        }
        core.state = to;
        match to {
            Open => warn!(breaker = %self.name, ?from, failures = core.failure_count, "circuit opened"),
            _ => info!(breaker = %self.name, ?from, ?to, "circuit state changed"),
        }
        let _ = self.transitions.send(StateTransition {
            from,
            to,
            at: Utc::now(),
        });
        self.wake.notify_one();
    }

    fn halt(&self) {
        let mut core = self.lock();
        if core.state == Halted {
            return;
        }
        let dropped = core.retry_queue.len();
        core.retry_queue.clear();
        self.transition(&mut core, Halted);
        drop(core);
        info!(breaker = %self.name, dropped, "circuit breaker halted");
        self.signal.trigger();
    }

    fn next_step(&self) -> Step {
        let core = self.lock();
        match core.state {
            Halted => Step::Exit,
            Open => Step::Probe,
            Closed | HalfOpen if !core.retry_queue.is_empty() => Step::Drain,
            Closed | HalfOpen => Step::Idle,
        }
    }

    /// 监督循环：`Open` 时探活，可连通且有积压时重投，否则等待唤醒
    async fn supervise(self: Arc<Self>) {
        loop {
            let outcome = match self.next_step() {
                Step::Exit => break,
                Step::Probe => self.probe_once().await,
                Step::Drain => self.redeliver_next().await,
                Step::Idle => {
                    tokio::select! {
                        _ = self.signal.cancelled() => Sleep::Cancelled,
                        _ = self.wake.notified() => Sleep::Elapsed,
                    }
                }
            };
            if outcome.is_cancelled() {
                self.halt();
                break;
            }
        }
        debug!(breaker = %self.name, "circuit breaker supervisor stopped");
    }

    /// 探活一次；失败则等待 `open_alive_check_delay` 后交回监督循环
    async fn probe_once(&self) -> Sleep {
        let result = tokio::select! {
            _ = self.signal.cancelled() => return Sleep::Cancelled,
            result = self.probe.check() => result,
        };

        match result {
            Ok(()) => {
                let mut core = self.lock();
                if core.state == Open {
                    core.success_count = 0;
                    self.transition(&mut core, HalfOpen);
                }
                Sleep::Elapsed
            }
            Err(err) => {
                debug!(breaker = %self.name, error = %err, "health probe failed; still open");
                self.signal.sleep(self.config.open_alive_check_delay).await
            }
        }
    }

    /// 按当前状态的间隔等待后，取出队首事件经总线重投
    async fn redeliver_next(&self) -> Sleep {
        let delay = match self.lock().state {
            HalfOpen => self.config.half_open_retry_delay,
            _ => self.config.closed_retry_delay,
        };
        if self.signal.sleep(delay).await.is_cancelled() {
            return Sleep::Cancelled;
        }

        let event = {
            let mut core = self.lock();
            match core.state {
                Closed | HalfOpen => core.retry_queue.pop_front(),
                // 等待期间重新断开或已停止，交回监督循环
                Open | Halted => None,
            }
        };

        if let Some(event) = event {
            info!(
                breaker = %self.name,
                event_id = event.event_id(),
                kind = %event.kind(),
                retry_count = event.retry_count(),
                "redelivering retry event"
            );
            self.bus.publish_to_subscribers(&event).await;
        }
        Sleep::Elapsed
    }
}
