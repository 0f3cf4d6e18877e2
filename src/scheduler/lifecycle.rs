//! 定时任务的启停管理
//!
//! 每个任务是一个长期运行的 tokio 任务：按间隔触发，停止信号通过
//! `CancellationToken` 下发。触发时另起任务执行，停止不会打断正在执行的批次。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 可被定时驱动的任务
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// 启动时读取一次
    async fn interval(&self) -> Duration;

    /// 一次触发，已有批次在执行时应直接跳过
    async fn on_tick(&self);
}

#[derive(Debug, Default)]
pub struct JobLifecycle {
    cancel_token: Mutex<Option<CancellationToken>>,
}

impl JobLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已在运行时返回 false
    pub fn start<J: ScheduledJob>(&self, job: Arc<J>) -> bool {
        let mut slot = self.cancel_token.lock();
        if slot.is_some() {
            info!("{}已在运行中", job.name());
            return false;
        }

        let token = CancellationToken::new();
        *slot = Some(token.clone());
        info!("启动{}", job.name());

        tokio::spawn(drive(job, token));
        true
    }

    /// 未在运行时返回 false
    pub fn stop(&self, name: &str) -> bool {
        match self.cancel_token.lock().take() {
            Some(token) => {
                token.cancel();
                info!("已发送停止信号给{}", name);
                true
            }
            None => {
                info!("{}未在运行", name);
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.lock().is_some()
    }
}

async fn drive<J: ScheduledJob>(job: Arc<J>, cancel_token: CancellationToken) {
    let period = job.interval().await;
    info!("{}已启动，间隔时间: {:?}", job.name(), period);

    // 第一次 tick 立即完成，即启动后马上执行一次
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("停止{}", job.name());
                break;
            }
            _ = ticker.tick() => {
                debug!("{}触发", job.name());
                let job = Arc::clone(&job);
                tokio::spawn(async move { job.on_tick().await });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &'static str {
            "计数任务"
        }

        async fn interval(&self) -> Duration {
            Duration::from_millis(20)
        }

        async fn on_tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_fires_immediately() {
        let job = Arc::new(CountingJob {
            ticks: AtomicUsize::new(0),
        });
        let lifecycle = JobLifecycle::new();

        assert!(lifecycle.start(Arc::clone(&job)));
        assert!(!lifecycle.start(Arc::clone(&job)));
        assert!(lifecycle.is_running());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(job.ticks.load(Ordering::SeqCst) >= 1);

        assert!(lifecycle.stop(job.name()));
        assert!(!lifecycle.is_running());
    }

    #[tokio::test]
    async fn test_stop_halts_ticks() {
        let job = Arc::new(CountingJob {
            ticks: AtomicUsize::new(0),
        });
        let lifecycle = JobLifecycle::new();
        lifecycle.start(Arc::clone(&job));
        tokio::time::sleep(Duration::from_millis(50)).await;
        lifecycle.stop(job.name());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_stop = job.ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let lifecycle = JobLifecycle::new();
        assert!(!lifecycle.stop("空任务"));
        assert!(!lifecycle.is_running());
    }
}
