// src/session.rs

use crate::{error::*, models::AccessToken};
use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 进程内共享的认证状态。只有 `AuthManager` 通过 `SessionPublisher` 写入。
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub authenticated: bool,
    pub token: Option<AccessToken>,
    pub last_auth_attempt: Option<DateTime<Local>>,
}

impl Session {
    pub fn bearer(&self) -> Option<&str> {
        match (&self.token, self.authenticated) {
            (Some(token), true) => Some(token.value.as_str()),
            _ => None,
        }
    }
}

pub fn channel() -> (SessionPublisher, SessionHandle) {
    let (tx, rx) = watch::channel(Session::default());
    (SessionPublisher { tx }, SessionHandle { rx })
}

pub struct SessionPublisher {
    tx: watch::Sender<Session>,
}

impl SessionPublisher {
    pub fn mark_authenticated(&self, token: AccessToken) {
        self.tx.send_modify(|s| {
            s.authenticated = true;
            s.token = Some(token);
        });
    }

    pub fn mark_unauthenticated(&self) {
        self.tx.send_if_modified(|s| {
            let changed = s.authenticated;
            s.authenticated = false;
            changed
        });
    }

    pub fn record_attempt(&self, at: DateTime<Local>) {
        // 尝试时间不影响等待方，不唤醒订阅者
        self.tx.send_if_modified(|s| {
            s.last_auth_attempt = Some(at);
            false
        });
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SessionHandle {
        SessionHandle {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<Session>,
}

impl SessionHandle {
    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().bearer().is_some()
    }

    pub fn snapshot(&self) -> Session {
        self.rx.borrow().clone()
    }

    /// 阻塞直到会话处于已认证状态，返回当前的 Bearer 令牌。
    pub async fn wait_authenticated(&mut self, cancel: &CancellationToken) -> AppResult<String> {
        loop {
            let bearer = self.rx.borrow_and_update().bearer().map(str::to_string);
            if let Some(bearer) = bearer {
                return Ok(bearer);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                res = self.rx.changed() => res.map_err(|_| AppError::SessionClosed)?,
            }
        }
    }
}
