// src/ui.rs

use crate::{constants, error::*, symbols, utils};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub fn print_header(title: &str) {
    println!("\n{}", "═".repeat(constants::UI_WIDTH));
    println!(" {}", title.cyan().bold());
    println!("{}", "═".repeat(constants::UI_WIDTH));
}

pub fn print_sub_header(title: &str) {
    println!("\n--- {} ---", title.bold());
}

pub fn box_message(title: &str, content: &[&str], color_func: fn(ColoredString) -> ColoredString) {
    println!("\n┌{}┐", "─".repeat(constants::UI_WIDTH - 2));
    println!("  {}", color_func(title.bold()));
    println!("├{}┤", "─".repeat(constants::UI_WIDTH - 2));
    for line in content {
        println!("  {}", line);
    }
    println!("└{}┘", "─".repeat(constants::UI_WIDTH - 2));
}

pub fn info(msg: &str) {
    println!("{} {}", *symbols::INFO, msg);
}

pub fn ok(msg: &str) {
    println!("{} {}", *symbols::OK, msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", *symbols::WARN, msg.yellow());
}

pub fn error(msg: &str) {
    eprintln!("{} {}", *symbols::ERROR, msg.red());
}

/// 已知大小时显示字节进度，否则显示已下载量和耗时
pub fn new_transfer_progress_bar(total_bytes: u64, label: &str) -> ProgressBar {
    if total_bytes > 0 {
        let pbar = ProgressBar::new(total_bytes);
        pbar.set_style(
            ProgressStyle::with_template(
                "{prefix:>8.cyan.bold} [{bar:40.green/white}] {bytes}/{total_bytes} ({binary_bytes_per_sec}) 已用时 {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        pbar.set_prefix(label.to_string());
        pbar
    } else {
        let pbar = ProgressBar::new_spinner();
        pbar.set_style(
            ProgressStyle::with_template("{prefix:>8.cyan.bold} {spinner} {bytes} 已用时 {elapsed_precise}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pbar.set_prefix(label.to_string());
        pbar
    }
}

/// 在单行上渲染倒计时，直到 `deadline`。可被取消。
pub async fn countdown(deadline: Instant, label: &str, cancel: &CancellationToken) -> AppResult<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    let result = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break Ok(());
        }
        spinner.set_message(format!("{} {}", label, utils::format_duration(remaining)));
        spinner.tick();
        if let Err(e) = utils::sleep_or_cancel(remaining.min(Duration::from_secs(1)), cancel).await {
            break Err(e);
        }
    };
    spinner.finish_and_clear();
    result
}
