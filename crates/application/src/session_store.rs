//! 服务端瞬态状态存储
//!
//! 存放 OAuth state、二维码登录等流程的短命记录：JSON 值加显式 TTL。
//! 主存储是外部 KV（Redis，见 infrastructure 层），这里定义统一的 trait
//! 和降级用的内存实现。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

/// 会话存储错误。正常的不可用会在降级路径内部消化，
/// 只有主备两条路径都失败时才会传播。
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// 瞬态会话存储
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 写入记录并设置 TTL（秒）
    async fn save(
        &self,
        id: &str,
        data: &serde_json::Value,
        ttl_seconds: u64,
    ) -> Result<(), SessionStoreError>;

    /// 读取记录，过期或不存在返回 None
    async fn load(&self, id: &str) -> Result<Option<serde_json::Value>, SessionStoreError>;

    /// 延长 TTL。对不存在或已过期的记录不做任何事。
    async fn touch(&self, id: &str, ttl_seconds: u64) -> Result<(), SessionStoreError>;

    /// 删除记录。删除不存在的记录是幂等的。
    async fn delete(&self, id: &str) -> Result<(), SessionStoreError>;
}

/// 内存实现。作为主存储不可达时的降级路径，也可单独用于测试。
/// 记录携带显式的 expires_at 毫秒时间戳，读取时惰性删除过期条目。
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    data: serde_json::Value,
    expires_at_ms: i64,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    #[cfg(test)]
    async fn expires_at_ms(&self, id: &str) -> Option<i64> {
        let entries = self.entries.read().await;
        entries.get(id).map(|entry| entry.expires_at_ms)
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(
        &self,
        id: &str,
        data: &serde_json::Value,
        ttl_seconds: u64,
    ) -> Result<(), SessionStoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            id.to_string(),
            MemoryEntry {
                data: data.clone(),
                expires_at_ms: Self::now_ms() + (ttl_seconds as i64) * 1000,
            },
        );
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<serde_json::Value>, SessionStoreError> {
        let mut entries = self.entries.write().await;
        match entries.get(id) {
            Some(entry) if Self::now_ms() < entry.expires_at_ms => Ok(Some(entry.data.clone())),
            Some(_) => {
                // 过期条目视为不存在，顺手删除
                entries.remove(id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn touch(&self, id: &str, ttl_seconds: u64) -> Result<(), SessionStoreError> {
        let mut entries = self.entries.write().await;
        let now = Self::now_ms();
        if let Some(entry) = entries.get_mut(id) {
            if now < entry.expires_at_ms {
                entry.expires_at_ms = now + (ttl_seconds as i64) * 1000;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionStoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(id);
        Ok(())
    }
}
