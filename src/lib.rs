// src/lib.rs

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod downloader;
pub mod error;
pub mod models;
pub mod session;
pub mod symbols;
pub mod ui;
pub mod utils;

use crate::{
    auth::AuthManager,
    cli::{Cli, LogLevel},
    client::ApiClient,
    config::{AppConfig, token::FileTokenCache},
    downloader::{CycleScheduler, DiskGate, DownloadEngine, LinkResolver, SystemDiskProbe},
    error::{AppError, AppResult},
};
use colored::*;
use log::{debug, error, info, warn};
use std::{env, fs, path::Path, sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

/// 库的公共入口点，由 `main.rs` 调用
pub async fn run_from_cli(args: Arc<Cli>, cancel: CancellationToken) -> AppResult<()> {
    // 先初始化日志，加载配置时的提示才能被记录
    let log_dir = config::app_data_dir(&args).unwrap_or_else(|_| env::temp_dir());
    init_logger(args.log_level, &log_dir);
    debug!("CLI 参数: username={:?}, root_path={:?}", args.username, args.root_path);

    let config = Arc::new(AppConfig::new(&args)?);
    debug!("加载的应用配置: {:?}", config);

    fs::create_dir_all(&config.cycle.zone_dir)?;
    let zone_dir = dunce::canonicalize(&config.cycle.zone_dir)?;
    let banner = [
        format!("账户: {}", config.credentials.username),
        format!("保存目录: {}", zone_dir.display()),
        format!("下载间隔: {}", utils::format_duration(config.cycle.interval)),
        format!("按 {} 可随时退出。", *symbols::CTRL_C),
    ];
    let lines: Vec<&str> = banner.iter().map(String::as_str).collect();
    ui::box_message("CZDS 区域文件下载", &lines, |s| s.cyan());
    info!("区域文件将保存到: {}", zone_dir.display());

    if !config.startup_delay.is_zero() {
        ui::countdown(Instant::now() + config.startup_delay, "下载即将开始", &cancel).await?;
    }

    let client = Arc::new(ApiClient::new(config.clone())?);
    let cache = Arc::new(FileTokenCache::new(&config.app_data_dir));
    let (publisher, session) = session::channel();
    let mut auth = AuthManager::new(
        client.clone(),
        config.credentials.clone(),
        cache,
        config.auth.clone(),
        publisher,
    );

    // 首次认证在前台进行，凭据被拒时直接退出
    let outcome = auth.authenticate(&cancel).await?;
    info!("首次认证结果: {:?}", outcome);
    println!(
        "{} 认证状态: {}",
        *symbols::INFO,
        if session.is_authenticated() { "已认证".green() } else { "等待重试".yellow() }
    );

    let auth_cancel = cancel.child_token();
    let mut auth_task = tokio::spawn(auth.run(auth_cancel.clone()));

    let gate = DiskGate::new(Arc::new(SystemDiskProbe), config.disk.clone());
    let mut scheduler = CycleScheduler::new(
        session,
        Arc::new(LinkResolver::new(client.clone())),
        Arc::new(DownloadEngine::new(client, gate)),
        config.retry.clone(),
        config.cycle.clone(),
    );

    let result = tokio::select! {
        res = scheduler.run(&cancel) => res,
        joined = &mut auth_task => match joined {
            Ok(Ok(())) => Err(AppError::Cancelled),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(AppError::Other(anyhow::anyhow!("认证任务异常退出: {}", e))),
        },
    };

    auth_cancel.cancel();
    if let Err(e) = &result {
        if e.is_fatal() {
            error!("发生不可恢复的错误: {}", e);
        }
    }
    result
}

/// 初始化文件日志。失败时只打印警告，不影响下载。
pub fn init_logger(level: LogLevel, app_data_dir: &Path) {
    if level == LogLevel::Off {
        return;
    }

    let app_name = clap::crate_name!();
    let log_file_path = app_data_dir.join(constants::LOG_FILE_NAME);
    if let Err(e) = fs::create_dir_all(app_data_dir) {
        eprintln!("警告: 无法创建日志目录 {:?}: {}", app_data_dir, e);
    }

    let file_appender = match fern::log_file(&log_file_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "警告: 无法打开日志文件 {:?} : {}。将尝试使用备用日志文件。",
                log_file_path, e
            );
            let fallback_path = env::temp_dir().join(format!(
                "{}-{}",
                app_name,
                constants::LOG_FALLBACK_FILE_NAME
            ));
            match fern::log_file(&fallback_path) {
                Ok(fb_file) => {
                    warn!("日志将写入备用文件: {:?}", fallback_path);
                    fb_file
                }
                Err(e_fb) => {
                    eprintln!(
                        "错误: 无法创建备用日志文件 {:?}: {}。日志将不会被记录到文件。",
                        fallback_path, e_fb
                    );
                    return;
                }
            }
        }
    };

    let result = fern::Dispatch::new()
        .level(level.into())
        // 依赖库的调试日志过于冗长
        .level_for("hyper_util", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Info)
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] [{:<5}] [{}:{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.line().unwrap_or(0),
                message
            ))
        })
        .chain(file_appender)
        .apply();

    if let Err(e) = result {
        eprintln!("警告: 日志系统初始化失败: {}", e);
    }
}
