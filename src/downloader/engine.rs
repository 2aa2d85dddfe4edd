// src/downloader/engine.rs

use super::{Downloader, disk::DiskGate, progress::TransferObserver};
use crate::{
    client::ApiClient,
    error::*,
    models::{DownloadTarget, TransferReport, TransferStatus},
    symbols, utils,
};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::Local;
use futures::StreamExt;
use indicatif::HumanBytes;
use log::{debug, error, info};
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::{
    StatusCode,
    header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap},
};
use std::{
    io::{BufWriter, Write as IoWrite},
    path::Path,
    sync::{Arc, LazyLock},
};
use tokio_util::sync::CancellationToken;

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'[^']*')?"?([^";]+)"?"#).unwrap()
});

/// 单个区域文件的传输：预检、空间检查、写入临时文件、原子改名。
///
/// 目标文件已存在时直接报错，不覆盖也不续传。中断留下的 `.part`
/// 文件不会被自动续传，由调度器在每轮结束时清理。
pub struct DownloadEngine {
    client: Arc<ApiClient>,
    disk_gate: DiskGate,
}

impl DownloadEngine {
    pub fn new(client: Arc<ApiClient>, disk_gate: DiskGate) -> Self {
        Self { client, disk_gate }
    }

    /// 用 HEAD 请求获取文件大小和服务器端文件名
    pub async fn probe(
        &self,
        target: &DownloadTarget,
        token: &str,
        cancel: &CancellationToken,
    ) -> AppResult<TransferStatus> {
        debug!("获取文件状态: {}", target.source_url);
        let send = self.client.authorized_head(&target.source_url, token).send();
        let res = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            res = send => res?,
        };
        if res.status() != StatusCode::OK {
            return Err(AppError::HttpStatus {
                status: res.status(),
                url: target.source_url.clone(),
            });
        }
        Ok(parse_transfer_status(res.headers(), &target.tld))
    }

    async fn stream_to_disk(
        &self,
        target: &DownloadTarget,
        token: &str,
        status: &TransferStatus,
        cancel: &CancellationToken,
    ) -> AppResult<u64> {
        let dir = target
            .local_path
            .parent()
            .ok_or_else(|| AppError::Other(anyhow!("无效的目标路径: {:?}", target.local_path)))?;
        let final_name = target
            .local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Other(anyhow!("无效的目标文件名: {:?}", target.local_path)))?;

        let temp_name = utils::partial_file_name(final_name, Local::now());
        let temp = tempfile::Builder::new()
            .prefix(&temp_name)
            .suffix("")
            .rand_bytes(0)
            .tempfile_in(dir)
            .with_context(|| format!("创建临时文件 '{}' 失败", temp_name))?;
        debug!("临时文件: {}", temp.path().display());

        let send = self.client.authorized_get(&target.source_url, token).send();
        let res = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            res = send => res?,
        };
        if res.status() != StatusCode::OK {
            return Err(AppError::HttpStatus {
                status: res.status(),
                url: target.source_url.clone(),
            });
        }

        let mut observer = TransferObserver::new(&status.tld_type, status.declared_length);
        let mut writer = BufWriter::with_capacity(1 << 20, temp.as_file());
        let mut stream = res.bytes_stream();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    observer.abandon();
                    return Err(AppError::Cancelled);
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    observer.abandon();
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.write_all(&chunk) {
                observer.abandon();
                return Err(e.into());
            }
            observer.observe(chunk.len());
        }
        if let Err(e) = writer.flush() {
            observer.abandon();
            return Err(e.into());
        }
        drop(writer);
        observer.finish();

        // 关闭句柄后再改名；改名是提交点
        let total = observer.total();
        let elapsed = observer.elapsed();
        temp.persist_noclobber(&target.local_path)?;
        info!(
            "'{}' 下载完成: {}，用时 {}",
            target.tld,
            HumanBytes(total),
            utils::format_duration(elapsed)
        );
        Ok(total)
    }
}

#[async_trait]
impl Downloader for DownloadEngine {
    async fn download(
        &self,
        target: &DownloadTarget,
        token: &str,
        cancel: &CancellationToken,
    ) -> AppResult<TransferReport> {
        println!("{} 下载链接: {}", *symbols::DOWN, target.source_url);
        if target.local_path.exists() {
            error!("{} 已存在，不会覆盖", target.local_path.display());
            return Err(AppError::AlreadyExists(target.local_path.clone()));
        }

        let status = self.probe(target, token, cancel).await?;
        if let Some(dir) = target.local_path.parent() {
            self.disk_gate.await_capacity(dir, status.declared_length, cancel).await?;
        }

        let file_name = target
            .local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("下载 '{}' 保存为 '{}'", status.original_file_name, file_name);
        println!(
            "{} 下载 '{}' ({}) 保存为 '{}'",
            *symbols::INFO,
            status.original_file_name,
            HumanBytes(status.declared_length),
            file_name
        );

        let started = std::time::Instant::now();
        let bytes = self.stream_to_disk(target, token, &status, cancel).await?;
        Ok(TransferReport {
            original_file_name: status.original_file_name,
            bytes,
            elapsed: started.elapsed(),
        })
    }
}

/// 解析 `Content-Length` 与 `Content-Disposition: attachment;filename=com.txt.gz`。
/// HEAD 响应的 `Response::content_length()` 不可靠，直接读取头部。
pub fn parse_transfer_status(headers: &HeaderMap, fallback_name: &str) -> TransferStatus {
    let declared_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let original_file_name = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(file_name_from_disposition)
        .unwrap_or_else(|| fallback_name.to_string());
    let tld_type = original_file_name
        .split('.')
        .next()
        .unwrap_or(&original_file_name)
        .to_string();
    TransferStatus {
        original_file_name,
        declared_length,
        tld_type,
    }
}

fn file_name_from_disposition(value: &str) -> Option<String> {
    let raw = FILENAME_RE.captures(value)?.get(1)?.as_str().trim();
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let name = Path::new(decoded.as_ref()).file_name()?.to_string_lossy().into_owned();
    (!name.is_empty()).then_some(name)
}
