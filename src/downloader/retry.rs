// src/downloader/retry.rs

use crate::{config::RetryPolicy, models::FailedDownloadItem, symbols, ui};
use chrono::Local;
use colored::*;
use log::{info, warn};
use reqwest::StatusCode;
use std::path::Path;

/// 本进程内失败的下载及其尝试次数，只由调度器任务访问。
pub struct RetryQueue {
    items: Vec<FailedDownloadItem>,
    policy: RetryPolicy,
}

impl RetryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            items: Vec::new(),
            policy,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, tld: &str) -> Option<&FailedDownloadItem> {
        self.items.iter().find(|i| i.tld == tld)
    }

    pub fn snapshot(&self) -> Vec<FailedDownloadItem> {
        self.items.clone()
    }

    /// 已有条目则累加次数并更新错误信息，否则新增
    pub fn record_failure(
        &mut self,
        tld: &str,
        local_path: &Path,
        source_url: &str,
        status_code: Option<StatusCode>,
        error_text: &str,
    ) {
        if let Some(item) = self.items.iter_mut().find(|i| i.tld == tld) {
            item.attempt_count = item.attempt_count.saturating_add(1);
            item.aborted_at = Local::now();
            item.last_status_code = status_code;
            item.last_error_text = error_text.to_string();
            warn!("'{}' 第 {} 次下载失败: {}", tld, item.attempt_count, error_text);
            return;
        }
        warn!("'{}' 下载失败，加入重试队列: {}", tld, error_text);
        self.items.push(FailedDownloadItem {
            tld: tld.to_string(),
            aborted_at: Local::now(),
            local_path: local_path.to_path_buf(),
            source_url: source_url.to_string(),
            attempt_count: 1,
            last_status_code: status_code,
            last_error_text: error_text.to_string(),
        });
    }

    pub fn remove(&mut self, tld: &str) {
        self.items.retain(|i| i.tld != tld);
    }

    pub fn is_non_retriable(&self, error_text: &str) -> bool {
        let text = error_text.to_lowercase();
        self.policy
            .non_retriable
            .iter()
            .any(|sig| text.contains(&sig.to_lowercase()))
    }

    /// 移除达到尝试上限或本轮无法恢复的条目，返回被移除的条目
    pub fn prune_exhausted(&mut self) -> Vec<FailedDownloadItem> {
        let (exhausted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|i| {
                i.attempt_count >= self.policy.max_attempts || self.is_non_retriable(&i.last_error_text)
            });
        self.items = kept;
        for item in &exhausted {
            info!(
                "'{}' 已放弃本轮重试 (尝试 {} 次): {}",
                item.tld, item.attempt_count, item.last_error_text
            );
        }
        exhausted
    }

    pub fn print_report(abandoned: &[FailedDownloadItem]) {
        if abandoned.is_empty() {
            return;
        }
        ui::print_sub_header("本轮未完成的下载");
        for item in abandoned {
            let status = item
                .last_status_code
                .map(|s| s.as_u16().to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "  {} {} (尝试 {} 次, 状态码 {}) {}",
                *symbols::ERROR,
                item.tld,
                item.attempt_count,
                status,
                item.last_error_text.red()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> RetryQueue {
        RetryQueue::new(RetryPolicy {
            max_attempts: 3,
            non_retriable: vec!["connection reset by peer".into()],
        })
    }

    fn fail(q: &mut RetryQueue, tld: &str, err: &str) {
        q.record_failure(tld, Path::new("/z/f.gz"), "https://h/d/f", Some(StatusCode::BAD_GATEWAY), err);
    }

    #[test]
    fn test_repeated_failures_increment_single_entry() {
        let mut q = queue();
        fail(&mut q, "com.zone", "timeout");
        fail(&mut q, "com.zone", "timeout again");
        assert_eq!(q.len(), 1);
        let item = q.get("com.zone").unwrap();
        assert_eq!(item.attempt_count, 2);
        assert_eq!(item.last_error_text, "timeout again");
        assert!(q.prune_exhausted().is_empty());
    }

    #[test]
    fn test_removed_after_three_attempts() {
        let mut q = queue();
        for _ in 0..3 {
            fail(&mut q, "net.zone", "HTTP 502");
        }
        fail(&mut q, "org.zone", "HTTP 502");
        let removed = q.prune_exhausted();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].tld, "net.zone");
        assert!(q.get("net.zone").is_none());
        assert!(q.get("org.zone").is_some());
    }

    #[test]
    fn test_connection_reset_pruned_immediately() {
        let mut q = queue();
        fail(&mut q, "com.zone", "error decoding response body: Connection reset by peer (os error 104)");
        assert_eq!(q.prune_exhausted().len(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_on_success() {
        let mut q = queue();
        fail(&mut q, "com.zone", "x");
        q.remove("com.zone");
        assert!(q.is_empty());
    }
}
