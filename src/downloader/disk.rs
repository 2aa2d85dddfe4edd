// src/downloader/disk.rs

use crate::{config::DiskPolicy, error::*, symbols, utils};
use indicatif::HumanBytes;
use log::{debug, warn};
use std::{path::Path, sync::Arc};
use sysinfo::Disks;
use tokio_util::sync::CancellationToken;

/// 查询目录所在磁盘的可用空间。返回 `None` 表示当前平台无法获取。
pub trait DiskSpaceProbe: Send + Sync {
    fn available_bytes(&self, dir: &Path) -> Option<u64>;
}

/// 基于 sysinfo：选择挂载点是目标目录最长前缀的磁盘
#[derive(Default)]
pub struct SystemDiskProbe;

impl DiskSpaceProbe for SystemDiskProbe {
    fn available_bytes(&self, dir: &Path) -> Option<u64> {
        let dir = dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| dir.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.available_space())
    }
}

/// 下载前检查磁盘空间，始终保留 `safety_margin` 比例的可用空间。
#[derive(Clone)]
pub struct DiskGate {
    probe: Arc<dyn DiskSpaceProbe>,
    policy: DiskPolicy,
}

impl DiskGate {
    pub fn new(probe: Arc<dyn DiskSpaceProbe>, policy: DiskPolicy) -> Self {
        Self { probe, policy }
    }

    pub fn has_capacity(&self, available: u64, required: u64) -> bool {
        available as f64 * (1.0 - self.policy.safety_margin) >= required as f64
    }

    /// 空间不足时按固定间隔轮询，直到满足或被取消
    pub async fn await_capacity(
        &self,
        dir: &Path,
        required: u64,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        loop {
            let Some(available) = self.probe.available_bytes(dir) else {
                debug!("无法获取 '{}' 的磁盘空间，跳过空间检查", dir.display());
                return Ok(());
            };
            if self.has_capacity(available, required) {
                return Ok(());
            }
            warn!(
                "磁盘空间不足: 需要 {}，可用 {} (保留 {:.0}%)",
                HumanBytes(required),
                HumanBytes(available),
                self.policy.safety_margin * 100.0
            );
            eprintln!(
                "\n{} 磁盘空间不足 (需要 {}，可用 {})，请释放空间，{} 后重新检查...",
                *symbols::WAIT,
                HumanBytes(required),
                HumanBytes(available),
                utils::format_duration(self.policy.poll_interval)
            );
            utils::sleep_or_cancel(self.policy.poll_interval, cancel).await?;
        }
    }
}
