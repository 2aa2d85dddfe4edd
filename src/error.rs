// src/error.rs

use reqwest::StatusCode;
use std::{error::Error as StdError, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("缺少必要配置: {0}")]
    Config(String),
    #[error("认证被拒绝 (状态码: {0})")]
    AuthRejected(StatusCode),
    #[error("认证响应不符合约定: {0}")]
    AuthContract(String),
    #[error("获取下载链接失败 (状态码: {status}): {body}")]
    LinkResolution { status: StatusCode, body: String },
    #[error("{} 已存在", .0.display())]
    AlreadyExists(PathBuf),
    #[error("服务器返回 {status}: {url}")]
    HttpStatus { status: StatusCode, url: String },
    #[error("会话通道已关闭，认证任务已退出")]
    SessionClosed,
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),
    #[error("网络中间件错误: {0}")]
    NetworkMiddleware(#[from] reqwest_middleware::Error),
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("临时文件持久化失败: {0}")]
    TempFilePersist(#[from] tempfile::PersistError),
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("无法解析来自 '{url}' 的API响应: {source}")]
    ApiParseFailed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("URL 解析错误: {0}")]
    Url(#[from] url::ParseError),
    #[error("任务已取消")]
    Cancelled,
    #[error("未知错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// 无法通过重试恢复的错误，调用方应当终止运行。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::AuthRejected(_)
                | AppError::AuthContract(_)
                | AppError::LinkResolution { .. }
                | AppError::ApiParseFailed { .. }
                | AppError::SessionClosed
        )
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            AppError::AuthRejected(status)
            | AppError::LinkResolution { status, .. }
            | AppError::HttpStatus { status, .. } => Some(*status),
            AppError::Network(err)
            | AppError::NetworkMiddleware(reqwest_middleware::Error::Reqwest(err)) => err.status(),
            _ => None,
        }
    }

    /// 拼接完整的错误链，底层的系统错误信息（如 "connection reset by peer"）只存在于 source 中。
    pub fn chain_text(&self) -> String {
        let mut text = self.to_string();
        let mut source = StdError::source(self);
        while let Some(err) = source {
            let msg = err.to_string();
            if !text.contains(&msg) {
                text.push_str(": ");
                text.push_str(&msg);
            }
            source = err.source();
        }
        text
    }
}

pub type AppResult<T> = Result<T, AppError>;
