// src/config/token.rs

use crate::{constants, error::AppResult, models::AccessToken};
use anyhow::Context;
use log::{debug, info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// 访问令牌的持久化缓存。缓存只是副本，读取后仍需按过期规则校验。
pub trait TokenCache: Send + Sync {
    fn load(&self) -> AppResult<Option<AccessToken>>;
    fn store(&self, token: &AccessToken) -> AppResult<()>;
}

/// 以 hex 编码的 JSON 形式保存在应用数据目录下
pub struct FileTokenCache {
    path: PathBuf,
}

impl FileTokenCache {
    pub fn new(app_data_dir: &Path) -> Self {
        Self {
            path: app_data_dir.join(constants::TOKEN_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenCache for FileTokenCache {
    fn load(&self) -> AppResult<Option<AccessToken>> {
        if !self.path.is_file() {
            debug!("Token 缓存文件 {:?} 不存在", self.path);
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("读取 Token 缓存 '{}' 失败", self.path.display()))?;
        // 损坏的缓存等同于没有缓存
        let bytes = match hex::decode(content.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Token 缓存 '{}' 不是有效的 hex，已忽略: {}", self.path.display(), e);
                return Ok(None);
            }
        };
        match serde_json::from_slice::<AccessToken>(&bytes) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Token 缓存 '{}' 内容无效，已忽略: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn store(&self, token: &AccessToken) -> AppResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec(token)?;
        fs::write(&self.path, hex::encode(json))
            .with_context(|| format!("保存 Token 到 '{}' 失败", self.path.display()))?;
        info!("Access Token 已缓存至: {}", self.path.display());
        Ok(())
    }
}

#[cfg(feature = "testing")]
#[derive(Default)]
pub struct MemoryTokenCache {
    slot: std::sync::Mutex<Option<AccessToken>>,
    stores: std::sync::atomic::AtomicUsize,
}

#[cfg(feature = "testing")]
impl MemoryTokenCache {
    pub fn with_token(token: AccessToken) -> Self {
        Self {
            slot: std::sync::Mutex::new(Some(token)),
            ..Default::default()
        }
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<AccessToken> {
        self.slot.lock().unwrap().clone()
    }
}

#[cfg(feature = "testing")]
impl TokenCache for MemoryTokenCache {
    fn load(&self) -> AppResult<Option<AccessToken>> {
        Ok(self.slot.lock().unwrap().clone())
    }

    fn store(&self, token: &AccessToken) -> AppResult<()> {
        *self.slot.lock().unwrap() = Some(token.clone());
        self.stores.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
