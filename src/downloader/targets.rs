// src/downloader/targets.rs

use crate::{models::DownloadTarget, utils};
use chrono::{DateTime, Local};
use itertools::Itertools;
use log::info;
use std::{collections::HashMap, fs, path::Path};

/// 把解析到的链接转换为本轮的下载目标。
///
/// 从列表末尾向前遍历，同一 TLD 只保留最先遇到的一个，即最靠后（最新）的链接；
/// 返回的顺序也是从新到旧。`approved` 非空时只保留其中列出的 TLD 类型。
pub fn plan_targets(
    links: &[String],
    zone_dir: &Path,
    date: DateTime<Local>,
    approved: &[String],
) -> Vec<DownloadTarget> {
    links
        .iter()
        .rev()
        .map(|link| (utils::tld_from_link(link), link))
        .unique_by(|(tld, _)| tld.clone())
        .map(|(tld, link)| DownloadTarget {
            local_path: zone_dir.join(utils::dated_file_name(&tld, date)),
            source_url: link.clone(),
            tld,
        })
        .filter(|target| {
            let allowed = approved.is_empty() || approved.iter().any(|t| t == target.tld_type());
            if !allowed {
                info!("TLD '{}' 不在已授权列表中，跳过", target.tld);
            }
            allowed
        })
        .collect()
}

/// 判断当天的文件是否已经完整存在，避免重启后重复下载数 GB 的文件。
///
/// 已知类型需超过对应的大小阈值；其余类型只要非空即可，
/// 因为最终文件只会在下载完成后通过改名产生。
pub fn looks_complete(target: &DownloadTarget, plausible_sizes: &HashMap<String, u64>) -> bool {
    let Ok(meta) = fs::metadata(&target.local_path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    match plausible_sizes.get(target.tld_type()) {
        Some(&threshold) => meta.len() > threshold,
        None => meta.len() > 0,
    }
}
