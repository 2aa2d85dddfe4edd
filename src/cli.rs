// src/cli.rs

use clap::{Parser, ValueEnum, command, crate_version};
use std::path::PathBuf;

/// 定义日志输出级别
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    version = crate_version!(),
    about,
    long_about = None,
    disable_help_flag = true,
    disable_version_flag = true,
)]
pub struct Cli {
    // --- 账户 (Account) ---
    /// ICANN 账户用户名
    #[arg(long, env = "ICANN_ACCOUNT_USERNAME", help_heading = "Account")]
    pub username: Option<String>,
    /// ICANN 账户密码
    #[arg(long, env = "ICANN_ACCOUNT_PASSWORD", hide_env_values = true, help_heading = "Account")]
    pub password: Option<String>,
    /// User-Agent，格式: <产品名>/<版本> <说明>
    #[arg(long, env = "USER_AGENT", help_heading = "Account")]
    pub user_agent: Option<String>,
    /// 已获授权的 TLD 列表 (逗号分隔，例如 'com,net')
    #[arg(long, env = "APPROVED_TLDS", value_delimiter = ',', help_heading = "Account")]
    pub approved_tlds: Vec<String>,

    // --- 下载选项 (Options) ---
    /// 程序根目录，区域文件保存在 <ROOT>/appdata/zone-files
    #[arg(long, env = "ICANN_ROOT_PATH", value_name = "ROOT", help_heading = "Options")]
    pub root_path: Option<PathBuf>,
    /// 直接指定区域文件的保存目录 (优先于 --root-path)
    #[arg(short, long, value_name = "DIR", help_heading = "Options")]
    pub output: Option<PathBuf>,
    /// 指定配置文件路径
    #[arg(short, long, value_name = "FILE", help_heading = "Options")]
    pub config: Option<PathBuf>,
    /// 两轮下载之间的间隔小时数 (不得少于 24)
    #[arg(long, value_name = "HOURS", help_heading = "Options")]
    pub hours_between: Option<u64>,
    /// 只执行一轮下载后退出
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub once: bool,
    /// 跳过启动前的倒计时
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub no_delay: bool,

    // --- 通用选项 (General) ---
    /// 显示此帮助信息并退出
    #[arg(short = 'h', long, action = clap::ArgAction::Help, global = true, help_heading = "General")]
    _help: Option<bool>,
    /// 显示版本信息并退出
    #[arg(short = 'V', long, action = clap::ArgAction::Version, global = true, help_heading = "General")]
    _version: Option<bool>,
    /// (隐藏参数) 设置日志文件的输出级别，用于调试
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true, hide = true)]
    pub log_level: LogLevel,
}
