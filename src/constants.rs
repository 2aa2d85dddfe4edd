// src/constants.rs

pub const UI_WIDTH: usize = 88;
pub const CONFIG_DIR_NAME: &str = concat!(".", clap::crate_name!());
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const TOKEN_FILE_NAME: &str = ".token";
pub const LOG_FILE_NAME: &str = "czds-dl.log";
pub const LOG_FALLBACK_FILE_NAME: &str = "fallback.log";
pub const ZONE_FILE_SUBDIR: &str = "appdata/zone-files";
pub const PARTIAL_FILE_SUFFIX: &str = ".part";
pub const ZONE_FILE_EXTENSION: &str = ".gz";

/// ICANN 条款要求两次下载之间至少间隔 24 小时
pub const MIN_HOURS_BETWEEN_CYCLES: u64 = 24;
pub const STARTUP_DELAY_SECS: u64 = 15;

pub mod api {
    pub const AUTHENTICATE_URL: &str = "https://account-api.icann.org/api/authenticate";
    pub const DOWNLOAD_LINKS_URL: &str = "https://czds-api.icann.org/czds/downloads/links";
    pub const AUTH_SUCCESS_MESSAGE: &str = "Authentication Successful";
}

pub mod policy {
    pub const TOKEN_VALIDITY_HOURS: u64 = 23;
    pub const MAX_TOKEN_VALIDITY_HOURS: u64 = 24;
    /// 认证接口限制为每个 IP 5 分钟内 8 次，这里按最坏情况处理
    pub const AUTH_COOLDOWN_SECS: u64 = 120;
    pub const RENEWAL_INTERVAL_SECS: u64 = 126;
    pub const MAX_DOWNLOAD_ATTEMPTS: u8 = 3;
    pub const RETRY_COOLDOWN_SECS: u64 = 60;
    pub const FAILURE_COOLDOWN_SECS: u64 = 60;
    pub const DISK_SAFETY_MARGIN: f64 = 0.1;
    pub const DISK_POLL_SECS: u64 = 60;
    pub const CONNECTION_RESET_SIGNATURE: &str = "connection reset by peer";

    pub const GIB: u64 = 1024 * 1024 * 1024;
    pub const MIB: u64 = 1024 * 1024;
    /// com 约 5 GB，net 约 500 MB
    pub const COM_PLAUSIBLE_BYTES: u64 = 4 * GIB;
    pub const NET_PLAUSIBLE_BYTES: u64 = 490 * MIB;
}
