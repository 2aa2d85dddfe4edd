// src/downloader/progress.rs

use crate::ui;
use indicatif::ProgressBar;
use std::time::{Duration, Instant};

/// 统计已写入的字节数和耗时，并刷新单行进度
pub struct TransferObserver {
    pbar: ProgressBar,
    total: u64,
    started: Instant,
}

impl TransferObserver {
    pub fn new(tld_type: &str, declared_length: u64) -> Self {
        Self {
            pbar: ui::new_transfer_progress_bar(declared_length, tld_type),
            total: 0,
            started: Instant::now(),
        }
    }

    pub fn observe(&mut self, chunk_len: usize) {
        self.total += chunk_len as u64;
        self.pbar.set_position(self.total);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(&self) {
        self.pbar.finish_and_clear();
    }

    pub fn abandon(&self) {
        self.pbar.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_bytes() {
        let mut observer = TransferObserver::new("com", 0);
        observer.observe(10);
        observer.observe(5);
        assert_eq!(observer.total(), 15);
        observer.finish();
    }
}
