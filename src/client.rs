// src/client.rs

use crate::{config::AppConfig, error::*};
use anyhow::anyhow;
use reqwest::{
    Client, IntoUrl, RequestBuilder,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::{sync::Arc, time::Duration};

/// ICANN 各接口共用的 HTTP 客户端。
///
/// `plain` 不带重试：认证接口按次数限流，下载流则可能持续数小时，都不能被中间件重放。
/// `robust` 带指数退避重试，只用于幂等的 HEAD 预检。
#[derive(Clone)]
pub struct ApiClient {
    pub plain: Client,
    pub robust: ClientWithMiddleware,
    config: Arc<AppConfig>,
}

impl ApiClient {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let user_agent = HeaderValue::from_str(&config.credentials.user_agent)
            .map_err(|e| AppError::Config(format!("USER_AGENT 无效: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // 不设置总超时：区域文件可能有数 GB
        let plain = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AppError::Other(anyhow!("创建 HTTP 客户端失败: {}", e)))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let robust = ClientBuilder::new(plain.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { plain, robust, config })
    }

    /// 元数据请求的超时时间
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn authenticate_url(&self) -> &str {
        &self.config.authenticate_url
    }

    pub fn download_links_url(&self) -> &str {
        &self.config.download_links_url
    }

    /// 带 Bearer 头的 GET，不设超时
    pub fn authorized_get<U: IntoUrl>(&self, url: U, token: &str) -> RequestBuilder {
        self.plain.get(url).header(AUTHORIZATION, bearer(token))
    }

    pub fn authorized_head<U: IntoUrl>(
        &self,
        url: U,
        token: &str,
    ) -> reqwest_middleware::RequestBuilder {
        self.robust
            .head(url)
            .header(AUTHORIZATION, bearer(token))
            .timeout(self.config.timeout)
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
