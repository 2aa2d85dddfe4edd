// src/auth.rs

use crate::{
    client::ApiClient,
    config::{AuthPolicy, Credentials, token::TokenCache},
    constants,
    error::*,
    models::{AccessToken, AuthResponse},
    session::SessionPublisher,
    utils,
};
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// 现有令牌仍在有效期内，没有发起请求
    AlreadyValid,
    Authenticated,
    /// 429，等待冷却后再试
    RateLimited,
    /// 没有拿到响应，等待冷却后再试
    TransportFailure,
}

/// 独占访问令牌及其生命周期，是会话状态的唯一写入方。
///
/// 认证接口限制每个 IP 5 分钟内最多 8 次请求。这里不做精确计数，
/// 而是要求任意两次尝试之间至少间隔 `policy.cooldown`。
pub struct AuthManager {
    client: Arc<ApiClient>,
    credentials: Credentials,
    cache: Arc<dyn TokenCache>,
    policy: AuthPolicy,
    publisher: SessionPublisher,
    token: Option<AccessToken>,
    last_attempt: Option<DateTime<Local>>,
}

impl AuthManager {
    pub fn new(
        client: Arc<ApiClient>,
        credentials: Credentials,
        cache: Arc<dyn TokenCache>,
        policy: AuthPolicy,
        publisher: SessionPublisher,
    ) -> Self {
        Self {
            client,
            credentials,
            cache,
            policy,
            publisher,
            token: None,
            last_attempt: None,
        }
    }

    pub fn last_attempt(&self) -> Option<DateTime<Local>> {
        self.last_attempt
    }

    /// 内存中没有可信令牌时才读取缓存；缓存同样按过期规则校验。
    pub fn token_expired(&mut self) -> bool {
        self.token_expired_at(Local::now())
    }

    pub fn token_expired_at(&mut self, now: DateTime<Local>) -> bool {
        if self.token.as_ref().is_none_or(AccessToken::is_implausible) {
            match self.cache.load() {
                Ok(Some(cached)) if !cached.is_implausible() => {
                    debug!("从缓存加载 Access Token (签发于 {})", cached.issued_at);
                    self.token = Some(cached);
                }
                Ok(_) => {}
                Err(e) => warn!("读取 Token 缓存失败: {}", e),
            }
        }
        match &self.token {
            Some(token) => token.is_expired_at(now, self.policy.token_validity),
            None => true,
        }
    }

    /// 确保会话已认证。瞬时失败（限流、网络）在内部消化为未认证状态；
    /// 凭据被拒或响应违反约定时返回致命错误。
    pub async fn authenticate(&mut self, cancel: &CancellationToken) -> AppResult<AuthOutcome> {
        if !self.token_expired() {
            if let Some(token) = self.token.clone() {
                self.publisher.mark_authenticated(token);
                return Ok(AuthOutcome::AlreadyValid);
            }
        }
        self.publisher.mark_unauthenticated();

        self.wait_for_cooldown(cancel).await?;

        let now = Local::now();
        self.last_attempt = Some(now);
        self.publisher.record_attempt(now);

        let body = json!({
            "username": self.credentials.username,
            "password": self.credentials.password,
        });
        info!("正在向 {} 请求新的 Access Token", self.client.authenticate_url());
        let send = self
            .client
            .plain
            .post(self.client.authenticate_url())
            .timeout(self.client.timeout())
            .json(&body)
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            res = send => res,
        };

        let response = match response {
            Ok(res) => res,
            Err(e) => {
                // 可能正处于一次长时间下载中，不能因此退出
                warn!("认证请求未得到响应，将在冷却后重试: {}", e);
                return Ok(AuthOutcome::TransportFailure);
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("认证请求过于频繁 (429)，将在冷却后重试");
            return Ok(AuthOutcome::RateLimited);
        }
        if status != StatusCode::OK {
            error!("认证失败，状态码: {}", status);
            return Err(AppError::AuthRejected(status));
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("读取认证响应失败，将在冷却后重试: {}", e);
                return Ok(AuthOutcome::TransportFailure);
            }
        };
        let parsed: AuthResponse =
            serde_json::from_str(&text).map_err(|source| AppError::ApiParseFailed {
                url: self.client.authenticate_url().to_string(),
                source,
            })?;

        if parsed.message != constants::api::AUTH_SUCCESS_MESSAGE || parsed.access_token.is_empty() {
            error!("认证响应缺少成功标记: '{}'", parsed.message);
            return Err(AppError::AuthContract(parsed.message));
        }

        let token = AccessToken::issue(parsed.access_token, Local::now(), self.policy.token_validity);
        if let Err(e) = self.cache.store(&token) {
            warn!("保存 Access Token 缓存失败: {}", e);
        }
        info!("认证成功，令牌有效期至 {}", token.expires_at.format("%Y-%m-%d %H:%M:%S"));
        self.token = Some(token.clone());
        self.publisher.mark_authenticated(token);
        Ok(AuthOutcome::Authenticated)
    }

    /// 首次尝试不等待；之后距上次尝试不足冷却时间则等待剩余部分
    async fn wait_for_cooldown(&self, cancel: &CancellationToken) -> AppResult<()> {
        let Some(last) = self.last_attempt else {
            return Ok(());
        };
        let elapsed = (Local::now() - last).to_std().unwrap_or_default();
        let remaining = self.policy.cooldown.saturating_sub(elapsed);
        if !remaining.is_zero() {
            debug!("距上次认证尝试不足冷却时间，等待 {}", utils::format_duration(remaining));
            utils::sleep_or_cancel(remaining, cancel).await?;
        }
        Ok(())
    }

    /// 后台续期循环：周期性检查令牌，过期则重新认证。
    /// 取消时返回 `Ok(())`，只有致命错误才会返回 `Err`。
    pub async fn run(mut self, cancel: CancellationToken) -> AppResult<()> {
        info!("令牌续期任务已启动，检查间隔 {:?}", self.policy.renewal_interval);
        loop {
            if self.token_expired() {
                self.publisher.mark_unauthenticated();
                match self.authenticate(&cancel).await {
                    Ok(outcome) => debug!("续期检查结果: {:?}", outcome),
                    Err(AppError::Cancelled) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
            if utils::sleep_or_cancel(self.policy.renewal_interval, &cancel).await.is_err() {
                info!("令牌续期任务已停止");
                return Ok(());
            }
        }
    }
}
