//! 调度器管理器
//!
//! 持有两个调度器及其定时任务，由调用方显式构造和传递。

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::auto_transfer::AutoTransferScheduler;
use super::lifecycle::{JobLifecycle, ScheduledJob};
use super::ready_resource::ReadyResourceScheduler;
use super::SchedulerDeps;
use crate::repository::{RepositoryError, SystemConfigRepository};

pub struct SchedulerManager {
    system_config: Arc<dyn SystemConfigRepository>,
    ready: Arc<ReadyResourceScheduler>,
    auto_transfer: Arc<AutoTransferScheduler>,
    ready_job: JobLifecycle,
    transfer_job: JobLifecycle,
}

impl SchedulerManager {
    pub fn new(deps: SchedulerDeps) -> Self {
        Self {
            system_config: Arc::clone(&deps.system_config),
            ready: Arc::new(ReadyResourceScheduler::new(deps.clone())),
            auto_transfer: Arc::new(AutoTransferScheduler::new(deps)),
            ready_job: JobLifecycle::new(),
            transfer_job: JobLifecycle::new(),
        }
    }

    pub fn ready_resource(&self) -> &Arc<ReadyResourceScheduler> {
        &self.ready
    }

    pub fn auto_transfer(&self) -> &Arc<AutoTransferScheduler> {
        &self.auto_transfer
    }

    pub fn start_all(&self) {
        self.start_ready_resource();
        self.start_auto_transfer();
    }

    pub fn stop_all(&self) {
        self.stop_ready_resource();
        self.stop_auto_transfer();
    }

    pub fn start_ready_resource(&self) -> bool {
        self.ready_job.start(Arc::clone(&self.ready))
    }

    pub fn stop_ready_resource(&self) -> bool {
        self.ready_job.stop(self.ready.name())
    }

    pub fn is_ready_resource_running(&self) -> bool {
        self.ready_job.is_running()
    }

    pub fn start_auto_transfer(&self) -> bool {
        self.transfer_job.start(Arc::clone(&self.auto_transfer))
    }

    pub fn stop_auto_transfer(&self) -> bool {
        self.transfer_job.stop(self.auto_transfer.name())
    }

    pub fn is_auto_transfer_running(&self) -> bool {
        self.transfer_job.is_running()
    }

    pub fn status(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("ready_resource", self.is_ready_resource_running()),
            ("auto_transfer", self.is_auto_transfer_running()),
        ])
    }

    /// 按 system_config 中的开关启停两个任务
    pub async fn apply_system_config(&self) -> Result<(), RepositoryError> {
        let ready_enabled = self.system_config.auto_process_enabled().await?;
        let transfer_enabled = self.system_config.auto_transfer_enabled().await?;

        if ready_enabled {
            self.start_ready_resource();
        } else {
            self.stop_ready_resource();
        }

        if transfer_enabled {
            self.start_auto_transfer();
        } else {
            self.stop_auto_transfer();
        }

        info!(
            "调度器状态已同步: 待处理资源={}, 自动转存={}",
            ready_enabled, transfer_enabled
        );
        Ok(())
    }
}

impl Drop for SchedulerManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
