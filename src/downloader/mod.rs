// src/downloader/mod.rs

pub mod cycle;
pub mod disk;
pub mod engine;
pub mod links;
pub mod progress;
pub mod retry;
pub mod targets;

pub use cycle::{CycleReport, CycleScheduler};
pub use disk::{DiskGate, DiskSpaceProbe, SystemDiskProbe};
pub use engine::DownloadEngine;
pub use links::LinkResolver;
pub use retry::RetryQueue;

use crate::{error::AppResult, models::{DownloadTarget, TransferReport}};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// 已授权下载链接的来源
#[async_trait]
pub trait LinkSource: Send + Sync {
    async fn resolve_links(&self, token: &str) -> AppResult<Vec<String>>;
}

/// 执行单个区域文件的下载。目标文件已存在时必须返回 `AppError::AlreadyExists`。
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        target: &DownloadTarget,
        token: &str,
        cancel: &CancellationToken,
    ) -> AppResult<TransferReport>;
}
