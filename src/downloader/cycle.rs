// src/downloader/cycle.rs

use super::{Downloader, LinkSource, retry::RetryQueue, targets};
use crate::{
    config::{CyclePolicy, RetryPolicy},
    error::*,
    models::DownloadTarget,
    session::SessionHandle,
    symbols, ui, utils,
};
use chrono::Local;
use colored::*;
use indicatif::HumanBytes;
use log::{debug, info, warn};
use std::{fs, sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

/// 一轮下载的各个阶段
enum CyclePhase {
    WaitAuth,
    ResolveLinks,
    Download(Vec<DownloadTarget>),
    RetryFailed,
    CleanupPartials,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retried: usize,
    pub abandoned: usize,
}

/// 驱动整个下载流程：等待认证、获取链接、逐个下载、重试、清理，
/// 然后空闲到下一个允许的时间窗口。
pub struct CycleScheduler {
    session: SessionHandle,
    links: Arc<dyn LinkSource>,
    downloader: Arc<dyn Downloader>,
    retry_queue: RetryQueue,
    policy: CyclePolicy,
    pass_started: Option<Instant>,
}

impl CycleScheduler {
    pub fn new(
        session: SessionHandle,
        links: Arc<dyn LinkSource>,
        downloader: Arc<dyn Downloader>,
        retry_policy: RetryPolicy,
        policy: CyclePolicy,
    ) -> Self {
        Self {
            session,
            links,
            downloader,
            retry_queue: RetryQueue::new(retry_policy),
            policy,
            pass_started: None,
        }
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry_queue
    }

    /// 最近一次开始获取链接的时刻，下一轮的时间窗口从这里起算
    pub fn pass_started(&self) -> Option<Instant> {
        self.pass_started
    }

    /// 无限循环；`once` 模式下完成一轮即返回
    pub async fn run(&mut self, cancel: &CancellationToken) -> AppResult<()> {
        let mut cycle_no = 1u64;
        loop {
            ui::print_header(&format!(
                "第 {} 轮下载 ({})",
                cycle_no,
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ));
            let report = self.run_cycle(cancel).await?;
            info!("第 {} 轮下载结束: {:?}", cycle_no, report);
            println!(
                "\n{} | {} | {} | 重试: {}",
                format!("成功: {}", report.downloaded).green(),
                format!("失败: {}", report.failed).red(),
                format!("跳过: {}", report.skipped).yellow(),
                report.retried
            );

            if self.policy.once {
                return Ok(());
            }

            // 间隔从本轮开始获取链接时计算，这是 ICANN 条款规定的下限
            let started = self.pass_started.unwrap_or_else(Instant::now);
            let Some(next_window) = started.checked_add(self.policy.interval) else {
                warn!("下载间隔 {:?} 超出可表示范围，不再开始新的一轮", self.policy.interval);
                ui::warn("下载间隔过大，程序将保持空闲直到退出。");
                cancel.cancelled().await;
                return Err(AppError::Cancelled);
            };
            info!(
                "下一轮下载将在 {} 后开始",
                utils::format_duration(next_window.saturating_duration_since(Instant::now()))
            );
            ui::countdown(next_window, "距离下一轮下载还有", cancel).await?;
            cycle_no += 1;
        }
    }

    /// 执行完整的一轮，不包含结尾的空闲等待
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> AppResult<CycleReport> {
        let mut report = CycleReport::default();
        let mut phase = CyclePhase::WaitAuth;
        loop {
            debug!("进入阶段: {}", phase_name(&phase));
            phase = match phase {
                CyclePhase::WaitAuth => {
                    self.session.wait_authenticated(cancel).await?;
                    CyclePhase::ResolveLinks
                }
                CyclePhase::ResolveLinks => {
                    let token = self.session.wait_authenticated(cancel).await?;
                    self.pass_started = Some(Instant::now());
                    let links = self.links.resolve_links(&token).await?;
                    if links.is_empty() {
                        warn!("未获取到任何下载链接，本轮没有可下载的文件");
                        ui::warn("未获取到任何下载链接。");
                    }
                    fs::create_dir_all(&self.policy.zone_dir)?;
                    let targets = targets::plan_targets(
                        &links,
                        &self.policy.zone_dir,
                        Local::now(),
                        &self.policy.approved_tlds,
                    );
                    ui::info(&format!("本轮共有 {} 个区域文件待处理", targets.len()));
                    CyclePhase::Download(targets)
                }
                CyclePhase::Download(targets) => {
                    for target in &targets {
                        self.download_one(target, &mut report, cancel).await?;
                    }
                    CyclePhase::RetryFailed
                }
                CyclePhase::RetryFailed => {
                    self.retry_failed(&mut report, cancel).await?;
                    CyclePhase::CleanupPartials
                }
                CyclePhase::CleanupPartials => {
                    self.cleanup_partials();
                    CyclePhase::Done
                }
                CyclePhase::Done => return Ok(report),
            };
        }
    }

    async fn download_one(
        &mut self,
        target: &DownloadTarget,
        report: &mut CycleReport,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        // 令牌可能在两次下载之间过期，此时暂停而不是失败
        let token = self.session.wait_authenticated(cancel).await?;

        if targets::looks_complete(target, &self.policy.plausible_sizes) {
            info!("今日的 '{}' 已存在，跳过", target.local_path.display());
            ui::info(&format!("今日的 {} 已存在，跳过。", target.tld));
            report.skipped += 1;
            return Ok(());
        }

        match self.downloader.download(target, &token, cancel).await {
            Ok(transfer) => {
                report.downloaded += 1;
                ui::ok(&format!(
                    "{} 下载完成 ({}，用时 {})",
                    target.tld,
                    HumanBytes(transfer.bytes),
                    utils::format_duration(transfer.elapsed)
                ));
                Ok(())
            }
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(e) if e.is_fatal() => Err(e),
            Err(AppError::AlreadyExists(path)) => {
                // 重试也无济于事，需要人工确认后删除
                report.failed += 1;
                warn!("'{}' 已存在但未通过完整性判断，需要人工处理", path.display());
                ui::warn(&format!(
                    "{} 已存在但可能不完整，请确认后手动删除，下一轮将重新下载。",
                    path.display()
                ));
                Ok(())
            }
            Err(e) => {
                report.failed += 1;
                let text = e.chain_text();
                ui::error(&format!("{} 下载失败: {}", target.tld, text));
                self.retry_queue.record_failure(
                    &target.tld,
                    &target.local_path,
                    &target.source_url,
                    e.status_code(),
                    &text,
                );
                utils::sleep_or_cancel(self.policy.failure_cooldown, cancel).await
            }
        }
    }

    /// 逐个重试失败的下载，每次重试前等待冷却时间，直到队列为空
    async fn retry_failed(&mut self, report: &mut CycleReport, cancel: &CancellationToken) -> AppResult<()> {
        let mut abandoned = self.retry_queue.prune_exhausted();
        while !self.retry_queue.is_empty() {
            for item in self.retry_queue.snapshot() {
                utils::sleep_or_cancel(self.policy.retry_cooldown, cancel).await?;
                let token = self.session.wait_authenticated(cancel).await?;
                report.retried += 1;
                println!(
                    "\n{} 重试 {} (第 {} 次)",
                    *symbols::WAIT,
                    item.tld,
                    item.attempt_count + 1
                );
                match self.downloader.download(&item.target(), &token, cancel).await {
                    Ok(transfer) => {
                        report.downloaded += 1;
                        report.failed = report.failed.saturating_sub(1);
                        self.retry_queue.remove(&item.tld);
                        ui::ok(&format!("{} 重试成功 ({})", item.tld, HumanBytes(transfer.bytes)));
                    }
                    Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        let text = e.chain_text();
                        ui::error(&format!("{} 重试失败: {}", item.tld, text));
                        self.retry_queue.record_failure(
                            &item.tld,
                            &item.local_path,
                            &item.source_url,
                            e.status_code(),
                            &text,
                        );
                    }
                }
            }
            abandoned.extend(self.retry_queue.prune_exhausted());
        }
        report.abandoned = abandoned.len();
        RetryQueue::print_report(&abandoned);
        Ok(())
    }

    /// 删除中断遗留的 `.part` 文件
    pub fn cleanup_partials(&self) -> usize {
        let entries = match fs::read_dir(&self.policy.zone_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("无法读取目录 '{}': {}", self.policy.zone_dir.display(), e);
                return 0;
            }
        };
        let mut removed = 0;
        for path in entries.filter_map(Result::ok).map(|e| e.path()) {
            if path.is_file() && utils::is_partial_file(&path) {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!("已删除残留的临时文件: {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("删除临时文件 '{}' 失败: {}", path.display(), e),
                }
            }
        }
        removed
    }
}

fn phase_name(phase: &CyclePhase) -> &'static str {
    match phase {
        CyclePhase::WaitAuth => "WAIT_AUTH",
        CyclePhase::ResolveLinks => "RESOLVE_LINKS",
        CyclePhase::Download(_) => "DOWNLOAD",
        CyclePhase::RetryFailed => "RETRY_FAILED",
        CyclePhase::CleanupPartials => "CLEANUP_PARTIALS",
        CyclePhase::Done => "DONE",
    }
}
