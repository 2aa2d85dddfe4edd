// src/downloader/links.rs

use super::LinkSource;
use crate::{client::ApiClient, error::*};
use async_trait::async_trait;
use log::{error, info};
use std::sync::Arc;

/// 通过 CZDS 接口获取当前账户已获授权的下载链接。本层不做重试。
pub struct LinkResolver {
    client: Arc<ApiClient>,
}

impl LinkResolver {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LinkSource for LinkResolver {
    async fn resolve_links(&self, token: &str) -> AppResult<Vec<String>> {
        let url = self.client.download_links_url();
        let res = self
            .client
            .authorized_get(url, token)
            .timeout(self.client.timeout())
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("获取下载链接失败: {} - {}", status, body);
            return Err(AppError::LinkResolution { status, body });
        }

        let text = res.text().await?;
        let links: Vec<String> = serde_json::from_str(&text).map_err(|source| AppError::ApiParseFailed {
            url: url.to_string(),
            source,
        })?;
        info!("获取到 {} 个下载链接", links.len());
        Ok(links)
    }
}
