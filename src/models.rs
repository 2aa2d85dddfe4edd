// src/models.rs

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};

/// 认证接口返回的访问令牌。签发时间取本地收到响应的时刻。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub issued_at: DateTime<Local>,
    pub expires_at: DateTime<Local>,
}

impl AccessToken {
    pub fn issue(value: String, now: DateTime<Local>, validity: Duration) -> Self {
        Self {
            value,
            issued_at: now,
            expires_at: now.checked_add_signed(to_chrono(validity)).unwrap_or(now),
        }
    }

    /// 令牌值为空，或签发时间是零值/远古时间（例如损坏的缓存）
    pub fn is_implausible(&self) -> bool {
        self.value.is_empty() || self.issued_at.year() < 2000
    }

    /// 比服务器的实际有效期更保守：跨年即视为过期，否则在 `issued_at + validity` 时刻过期。
    pub fn is_expired_at(&self, now: DateTime<Local>, validity: Duration) -> bool {
        if self.issued_at.year() < now.year() {
            return true;
        }
        match self.issued_at.checked_add_signed(to_chrono(validity)) {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

// 避免把令牌写进日志
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"***")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

/// 认证接口的响应体
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub message: String,
}

/// 一个待下载的区域文件。`tld` 取自链接的最后一段 (例如 `com.zone`)，用作去重和重试的键。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub tld: String,
    pub source_url: String,
    pub local_path: PathBuf,
}

impl DownloadTarget {
    /// 文件类型，例如 `com.zone` -> `com`
    pub fn tld_type(&self) -> &str {
        self.tld.split('.').next().unwrap_or(&self.tld)
    }
}

/// HEAD 预检的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatus {
    /// 例如 `com.txt.gz`
    pub original_file_name: String,
    pub declared_length: u64,
    /// 例如 `com`
    pub tld_type: String,
}

#[derive(Debug, Clone)]
pub struct TransferReport {
    pub original_file_name: String,
    pub bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct FailedDownloadItem {
    pub tld: String,
    pub aborted_at: DateTime<Local>,
    pub local_path: PathBuf,
    pub source_url: String,
    pub attempt_count: u8,
    pub last_status_code: Option<StatusCode>,
    pub last_error_text: String,
}

impl FailedDownloadItem {
    pub fn target(&self) -> DownloadTarget {
        DownloadTarget {
            tld: self.tld.clone(),
            source_url: self.source_url.clone(),
            local_path: self.local_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DAY: Duration = Duration::from_secs(23 * 3600);

    fn token_issued(at: DateTime<Local>) -> AccessToken {
        AccessToken::issue("jwt".into(), at, DAY)
    }

    #[test]
    fn test_token_expiry_boundary() {
        let issued = Local.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
        let token = token_issued(issued);
        let edge = issued + ChronoDuration::hours(23);

        assert!(!token.is_expired_at(issued, DAY));
        assert!(!token.is_expired_at(edge - ChronoDuration::seconds(1), DAY));
        assert!(token.is_expired_at(edge, DAY));
        assert!(token.is_expired_at(edge + ChronoDuration::minutes(5), DAY));
        assert_eq!(token.expires_at, edge);
    }

    #[test]
    fn test_token_issued_last_year_is_expired() {
        let issued = Local.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap();
        let now = Local.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        assert!(token_issued(issued).is_expired_at(now, DAY));
    }

    #[test]
    fn test_implausible_token() {
        let zero = Local.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert!(token_issued(zero).is_implausible());
        let mut empty = token_issued(Local::now());
        empty.value.clear();
        assert!(empty.is_implausible());
        assert!(!token_issued(Local::now()).is_implausible());
    }

    #[test]
    fn test_target_tld_type() {
        let target = DownloadTarget {
            tld: "net.zone".into(),
            source_url: "https://czds-api.icann.org/czds/downloads/net.zone".into(),
            local_path: PathBuf::from("/tmp/x"),
        };
        assert_eq!(target.tld_type(), "net");
    }
}
