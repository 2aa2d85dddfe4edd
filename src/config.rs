// src/config.rs

pub mod token;

use crate::{
    cli::Cli,
    constants::{self, policy},
    error::{AppError, AppResult},
    ui,
};
use anyhow::{Context, anyhow};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    pub authenticate_url: Option<String>,
    pub download_links_url: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    /// 仅作用于 HEAD 预检
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    pub token_validity_hours: Option<u64>,
    pub auth_cooldown_secs: Option<u64>,
    pub renewal_interval_secs: Option<u64>,
    pub max_download_attempts: Option<u8>,
    pub retry_cooldown_secs: Option<u64>,
    pub failure_cooldown_secs: Option<u64>,
    pub disk_safety_margin: Option<f64>,
    pub disk_poll_secs: Option<u64>,
    pub hours_between_cycles: Option<u64>,
    #[serde(default)]
    pub non_retriable_errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// 各类区域文件被视为"已完整下载"的最小字节数
    #[serde(default)]
    pub plausible_sizes: HashMap<String, u64>,
}

impl ExternalConfig {
    pub(crate) fn default_app_config() -> Self {
        let network = NetworkConfig {
            authenticate_url: Some(constants::api::AUTHENTICATE_URL.into()),
            download_links_url: Some(constants::api::DOWNLOAD_LINKS_URL.into()),
            connect_timeout_secs: Some(30),
            timeout_secs: Some(120),
            max_retries: Some(3),
        };
        let policy = PolicyConfig {
            token_validity_hours: Some(policy::TOKEN_VALIDITY_HOURS),
            auth_cooldown_secs: Some(policy::AUTH_COOLDOWN_SECS),
            renewal_interval_secs: Some(policy::RENEWAL_INTERVAL_SECS),
            max_download_attempts: Some(policy::MAX_DOWNLOAD_ATTEMPTS),
            retry_cooldown_secs: Some(policy::RETRY_COOLDOWN_SECS),
            failure_cooldown_secs: Some(policy::FAILURE_COOLDOWN_SECS),
            disk_safety_margin: Some(policy::DISK_SAFETY_MARGIN),
            disk_poll_secs: Some(policy::DISK_POLL_SECS),
            hours_between_cycles: Some(constants::MIN_HOURS_BETWEEN_CYCLES),
            non_retriable_errors: vec![policy::CONNECTION_RESET_SIGNATURE.into()],
        };
        Self {
            network,
            policy,
            plausible_sizes: default_plausible_sizes(),
        }
    }
}

fn default_plausible_sizes() -> HashMap<String, u64> {
    HashMap::from([
        ("com".into(), policy::COM_PLAUSIBLE_BYTES),
        ("net".into(), policy::NET_PLAUSIBLE_BYTES),
    ])
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub token_validity: Duration,
    pub cooldown: Duration,
    pub renewal_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub non_retriable: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DiskPolicy {
    pub safety_margin: f64,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct CyclePolicy {
    pub zone_dir: PathBuf,
    pub approved_tlds: Vec<String>,
    pub interval: Duration,
    pub failure_cooldown: Duration,
    pub retry_cooldown: Duration,
    pub plausible_sizes: HashMap<String, u64>,
    pub once: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub app_data_dir: PathBuf,
    pub authenticate_url: String,
    pub download_links_url: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub startup_delay: Duration,
    pub auth: AuthPolicy,
    pub retry: RetryPolicy,
    pub disk: DiskPolicy,
    pub cycle: CyclePolicy,
}

impl AppConfig {
    pub fn new(args: &Cli) -> AppResult<Self> {
        let credentials = Credentials {
            username: required(args.username.as_deref(), "ICANN_ACCOUNT_USERNAME")?,
            password: required(args.password.as_deref(), "ICANN_ACCOUNT_PASSWORD")?,
            user_agent: required(args.user_agent.as_deref(), "USER_AGENT")?,
        };

        let config_path = config_path(args)?;
        let root = match &args.root_path {
            Some(path) => path.clone(),
            None => install_dir()?,
        };
        let zone_dir = args
            .output
            .clone()
            .unwrap_or_else(|| root.join(constants::ZONE_FILE_SUBDIR));
        let app_data_dir = app_data_dir(args)?;

        let external = load_or_create_external_config(&config_path)?;
        Ok(Self::from_parts(credentials, app_data_dir, zone_dir, args, external))
    }

    fn from_parts(
        credentials: Credentials,
        app_data_dir: PathBuf,
        zone_dir: PathBuf,
        args: &Cli,
        external: ExternalConfig,
    ) -> Self {
        let network = external.network;
        let p = external.policy;
        let secs = |v: Option<u64>, default: u64| Duration::from_secs(v.unwrap_or(default));

        let requested_hours = args
            .hours_between
            .or(p.hours_between_cycles)
            .unwrap_or(constants::MIN_HOURS_BETWEEN_CYCLES);
        let hours = if requested_hours < constants::MIN_HOURS_BETWEEN_CYCLES {
            let notice = format!(
                "下载间隔 {} 小时低于 ICANN 要求的 {} 小时，已自动调整。",
                requested_hours,
                constants::MIN_HOURS_BETWEEN_CYCLES
            );
            warn!("{}", notice);
            ui::warn(&notice);
            constants::MIN_HOURS_BETWEEN_CYCLES
        } else {
            requested_hours
        };

        // 服务器端令牌有效期为 24 小时，本地只能更保守
        let requested_validity = p.token_validity_hours.unwrap_or(policy::TOKEN_VALIDITY_HOURS);
        let token_validity_hours = requested_validity.clamp(1, policy::MAX_TOKEN_VALIDITY_HOURS);
        if token_validity_hours != requested_validity {
            warn!(
                "令牌有效期 {} 小时超出范围，已调整为 {} 小时",
                requested_validity, token_validity_hours
            );
        }

        let non_retriable = if p.non_retriable_errors.is_empty() {
            vec![policy::CONNECTION_RESET_SIGNATURE.into()]
        } else {
            p.non_retriable_errors
        };
        let mut plausible_sizes = default_plausible_sizes();
        plausible_sizes.extend(external.plausible_sizes);

        Self {
            credentials,
            app_data_dir,
            authenticate_url: network
                .authenticate_url
                .unwrap_or_else(|| constants::api::AUTHENTICATE_URL.into()),
            download_links_url: network
                .download_links_url
                .unwrap_or_else(|| constants::api::DOWNLOAD_LINKS_URL.into()),
            connect_timeout: secs(network.connect_timeout_secs, 30),
            timeout: secs(network.timeout_secs, 120),
            max_retries: network.max_retries.unwrap_or(3),
            startup_delay: if args.no_delay {
                Duration::ZERO
            } else {
                Duration::from_secs(constants::STARTUP_DELAY_SECS)
            },
            auth: AuthPolicy {
                token_validity: Duration::from_secs(token_validity_hours * 3600),
                cooldown: secs(p.auth_cooldown_secs, policy::AUTH_COOLDOWN_SECS),
                renewal_interval: secs(p.renewal_interval_secs, policy::RENEWAL_INTERVAL_SECS),
            },
            retry: RetryPolicy {
                max_attempts: p.max_download_attempts.unwrap_or(policy::MAX_DOWNLOAD_ATTEMPTS),
                non_retriable,
            },
            disk: DiskPolicy {
                safety_margin: p
                    .disk_safety_margin
                    .unwrap_or(policy::DISK_SAFETY_MARGIN)
                    .clamp(0.0, 0.99),
                poll_interval: secs(p.disk_poll_secs, policy::DISK_POLL_SECS),
            },
            cycle: CyclePolicy {
                zone_dir,
                approved_tlds: args
                    .approved_tlds
                    .iter()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect(),
                interval: Duration::from_secs(hours.saturating_mul(3600)),
                failure_cooldown: secs(p.failure_cooldown_secs, policy::FAILURE_COOLDOWN_SECS),
                retry_cooldown: secs(p.retry_cooldown_secs, policy::RETRY_COOLDOWN_SECS),
                plausible_sizes,
                once: args.once,
            },
        }
    }
}

/// 配置文件路径：`--config` 或 `~/.czds-dl/config.json`
pub fn config_path(args: &Cli) -> AppResult<PathBuf> {
    match &args.config {
        Some(path) => Ok(path.clone()),
        None => default_config_path(),
    }
}

/// 配置文件所在目录，同时存放日志与 Token 缓存
pub fn app_data_dir(args: &Cli) -> AppResult<PathBuf> {
    let config_path = config_path(args)?;
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.to_path_buf()),
        _ => Ok(PathBuf::from(".")),
    }
}

fn required(value: Option<&str>, name: &str) -> AppResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::Config(name.to_string())),
    }
}

/// 可执行文件所在目录
fn install_dir() -> AppResult<PathBuf> {
    let exe = std::env::current_exe().context("无法获取程序路径")?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| AppError::Other(anyhow!("无法获取程序所在目录")))
}

pub(crate) fn default_config_path() -> AppResult<PathBuf> {
    let path = dirs::home_dir()
        .ok_or_else(|| AppError::Other(anyhow!("无法获取用户主目录")))?
        .join(constants::CONFIG_DIR_NAME)
        .join(constants::CONFIG_FILE_NAME);
    Ok(path)
}

pub(crate) fn load_or_create_external_config(config_path: &Path) -> AppResult<ExternalConfig> {
    if config_path.is_file() {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("读取配置文件 '{}' 失败", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件 '{}' 失败", config_path.display()))
            .map_err(AppError::from)
    } else {
        info!("配置文件 {:?} 不存在，将创建默认配置。", config_path);
        let config = ExternalConfig::default_app_config();

        if let Some(dir) = config_path.parent() {
            fs::create_dir_all(dir)?;
        }

        let json_content = serde_json::to_string_pretty(&config)?;
        fs::write(config_path, json_content)?;

        Ok(config)
    }
}

#[cfg(feature = "testing")]
impl Default for AppConfig {
    fn default() -> Self {
        let dir = std::env::temp_dir().join("czds-dl-test");
        Self {
            credentials: Credentials {
                username: "user@example.com".into(),
                password: "secret".into(),
                user_agent: "czds-dl/1.0 test".into(),
            },
            app_data_dir: dir.clone(),
            authenticate_url: constants::api::AUTHENTICATE_URL.into(),
            download_links_url: constants::api::DOWNLOAD_LINKS_URL.into(),
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
            max_retries: 0,
            startup_delay: Duration::ZERO,
            auth: AuthPolicy {
                token_validity: Duration::from_secs(policy::TOKEN_VALIDITY_HOURS * 3600),
                cooldown: Duration::from_millis(50),
                renewal_interval: Duration::from_millis(50),
            },
            retry: RetryPolicy {
                max_attempts: policy::MAX_DOWNLOAD_ATTEMPTS,
                non_retriable: vec![policy::CONNECTION_RESET_SIGNATURE.into()],
            },
            disk: DiskPolicy {
                safety_margin: policy::DISK_SAFETY_MARGIN,
                poll_interval: Duration::from_millis(10),
            },
            cycle: CyclePolicy {
                zone_dir: dir,
                approved_tlds: vec![],
                interval: Duration::from_millis(50),
                failure_cooldown: Duration::from_millis(1),
                retry_cooldown: Duration::from_millis(1),
                plausible_sizes: default_plausible_sizes(),
                once: true,
            },
        }
    }
}
