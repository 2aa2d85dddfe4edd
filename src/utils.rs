// src/utils.rs

use crate::{constants, error::*};
use chrono::{DateTime, Local};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::{path::Path, sync::LazyLock, time::Duration};
use tokio_util::sync::CancellationToken;
use url::Url;

static ILLEGAL_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|\s]"#).unwrap());

/// 格式化为 `hh:mm:ss`，小时数不封顶
pub fn format_duration(d: Duration) -> String {
    let secs = (d.as_millis() + 500) / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// 可被取消的等待；取消时返回 `AppError::Cancelled`
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> AppResult<()> {
    if duration.is_zero() {
        return if cancel.is_cancelled() { Err(AppError::Cancelled) } else { Ok(()) };
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// 链接的最后一段，例如 `https://czds-api.icann.org/czds/downloads/com.zone` -> `com.zone`
pub fn tld_from_link(link: &str) -> String {
    let path_segment = Url::parse(link)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.next_back())
                .map(|seg| percent_decode_str(seg).decode_utf8_lossy().into_owned())
        })
        .unwrap_or_else(|| link.rsplit('/').next().unwrap_or(link).to_string());
    sanitize_segment(&path_segment)
}

fn sanitize_segment(name: &str) -> String {
    let name = ILLEGAL_CHARS_RE.replace_all(name.trim(), "_");
    let name = name.trim_matches('.');
    if name.is_empty() { "unnamed".to_string() } else { name.to_string() }
}

/// `<YYYY>-<MM>-<DD>-<segment>.gz`
pub fn dated_file_name(segment: &str, date: DateTime<Local>) -> String {
    let mut name = format!("{}-{}", date.format("%Y-%m-%d"), segment);
    if !name.ends_with(constants::ZONE_FILE_EXTENSION) {
        name.push_str(constants::ZONE_FILE_EXTENSION);
    }
    name
}

/// 与目标文件同目录的临时文件名，带时间后缀，不会与最终文件名冲突
pub fn partial_file_name(final_name: &str, now: DateTime<Local>) -> String {
    format!(
        "{}_{}{}",
        final_name,
        now.format("%H%M%S%.9f"),
        constants::PARTIAL_FILE_SUFFIX
    )
}

pub fn is_partial_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(constants::PARTIAL_FILE_SUFFIX))
}
