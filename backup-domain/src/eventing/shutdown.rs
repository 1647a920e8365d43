//! 关闭信号（ShutdownSignal）
//!
//! 进程内共享的取消上下文：`CancellationToken` 负责广播关闭，
//! `TaskTracker` 负责跟踪后台循环（熔断器监督任务、延迟重放任务），
//! 关闭时统一取消并等待其退出。
//!
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// 可取消等待的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sleep {
    /// 等待时间已到
    Elapsed,
    /// 等待期间收到关闭信号，提前返回
    Cancelled,
}

impl Sleep {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Sleep::Cancelled)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生子信号：父信号触发时子信号随之触发，子信号单独触发不影响父信号。
    /// 子信号与父信号共享同一个任务跟踪器。
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            tracker: self.tracker.clone(),
        }
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// 等待 `duration`，收到关闭信号时提前返回 `Sleep::Cancelled`
    pub async fn sleep(&self, duration: Duration) -> Sleep {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Sleep::Cancelled,
            _ = tokio::time::sleep(duration) => Sleep::Elapsed,
        }
    }

    /// 启动一个受跟踪的后台任务
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// 触发关闭并等待所有受跟踪的任务退出
    pub async fn shutdown(&self) {
        self.trigger();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn sleep_elapses_without_signal() {
        let signal = ShutdownSignal::new();
        assert_eq!(signal.sleep(Duration::from_secs(5)).await, Sleep::Elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_resolves_early_when_triggered() {
        let signal = ShutdownSignal::new();
        let sleeper = signal.clone();
        let started = tokio::time::Instant::now();
        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(3600)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();

        assert_eq!(handle.await.unwrap(), Sleep::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn child_follows_parent_but_not_the_other_way() {
        let parent = ShutdownSignal::new();
        let child = parent.child();
        child.trigger();
        assert!(child.is_triggered());
        assert!(!parent.is_triggered());

        let child2 = parent.child();
        parent.trigger();
        assert!(child2.is_triggered());
    }

    #[tokio::test]
    async fn shutdown_waits_for_tracked_tasks() {
        let signal = ShutdownSignal::new();
        let finished = Arc::new(AtomicBool::new(false));
        {
            let signal2 = signal.clone();
            let finished = finished.clone();
            signal.spawn(async move {
                signal2.cancelled().await;
                finished.store(true, Ordering::SeqCst);
            });
        }

        signal.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
