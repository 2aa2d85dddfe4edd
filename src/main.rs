// src/main.rs

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use czds_dl::{cli::Cli, error::AppError, run_from_cli};
use std::{env, sync::Arc};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // 为 Windows 终端启用 ANSI 颜色支持
    #[cfg(windows)]
    {
        colored::control::set_virtual_terminal(true).ok();
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n{} 收到中断信号，正在退出...", "[!]".yellow());
                cancel.cancel();
            }
        });
    }

    let bin_name = env::var("CARGO_BIN_NAME").unwrap_or_else(|_| "czds-dl".to_string());
    let after_help = format!(
        "示例:\n  # 使用环境变量中的账户信息，持续运行\n  {bin}\n\n  # 指定保存目录，只下载一轮\n  {bin} -o /data/zones --once\n\n  # 只下载已授权的部分 TLD\n  {bin} --approved-tlds com,net",
        bin = bin_name
    );
    let cmd = Cli::command().after_help(after_help);
    let args = match Cli::from_arg_matches(&cmd.get_matches()) {
        Ok(args) => Arc::new(args),
        Err(e) => e.exit(),
    };

    match run_from_cli(args, cancel).await {
        Ok(()) => {}
        Err(AppError::Cancelled) => {
            eprintln!("{} 用户中断程序。", "[!]".yellow());
            std::process::exit(130);
        }
        Err(e) => {
            eprintln!("\n{} {}", "[X]".red(), format!("程序执行出错: {}", e).red());
            std::process::exit(1);
        }
    }
}
