//! Redis 会话存储
//!
//! `RedisSessionStore` 用 Redis 的键过期实现 TTL，键名带 `session:` 前缀。
//! `FallbackSessionStore` 在 Redis 操作失败时退回内存存储并继续服务，
//! 每次降级都会记录告警日志，只有两边都失败才向调用方报错。
//! 降级期间两边的数据互不同步，Redis 恢复后内存中的会话不会回写。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use application::session_store::{MemorySessionStore, SessionStore, SessionStoreError};
use config::RedisConfig;

const KEY_PREFIX: &str = "session:";

/// 基于 Redis 的会话存储
#[derive(Clone)]
pub struct RedisSessionStore {
    connection: ConnectionManager,
    op_timeout: Duration,
}

impl RedisSessionStore {
    /// 建立连接。`ConnectionManager` 内部自带断线重连，
    /// 这里只在初始连接失败或超时时报错。
    pub async fn connect(config: &RedisConfig) -> Result<Self, SessionStoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| SessionStoreError::Unavailable("redis url not configured".into()))?;
        let op_timeout = Duration::from_millis(config.command_timeout_ms);
        let client = redis::Client::open(url)
            .map_err(|e| SessionStoreError::Unavailable(format!("invalid redis url: {e}")))?;
        // 建连也要有上限，对端接受了 TCP 连接却不应答时不能卡死启动流程
        let connection = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                SessionStoreError::Unavailable(format!(
                    "redis connect timed out after {}ms",
                    op_timeout.as_millis()
                ))
            })?
            .map_err(|e| SessionStoreError::Unavailable(format!("redis connect failed: {e}")))?;
        tracing::info!("Redis 会话存储已连接");
        Ok(Self {
            connection,
            op_timeout,
        })
    }

    fn key(session_id: &str) -> String {
        format!("{KEY_PREFIX}{session_id}")
    }

    /// 给单个 Redis 命令加超时。连接挂起（而非被拒绝）时命令不会自行
    /// 返回错误，超时后按主存储不可用处理，调用方可以立即降级。
    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, SessionStoreError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(map_redis_err),
            Err(_) => Err(SessionStoreError::Unavailable(format!(
                "redis {operation} timed out after {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

fn map_redis_err(err: redis::RedisError) -> SessionStoreError {
    SessionStoreError::Unavailable(format!("redis error: {err}"))
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save(
        &self,
        session_id: &str,
        data: &serde_json::Value,
        ttl_seconds: u64,
    ) -> Result<(), SessionStoreError> {
        let payload = serde_json::to_string(data)
            .map_err(|e| SessionStoreError::Unavailable(format!("serialize session: {e}")))?;
        let mut conn = self.connection.clone();
        let _: () = self
            .with_timeout("save", conn.set_ex(Self::key(session_id), payload, ttl_seconds))
            .await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<serde_json::Value>, SessionStoreError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = self
            .with_timeout("load", conn.get(Self::key(session_id)))
            .await?;
        match payload {
            Some(raw) => {
                let value = serde_json::from_str(&raw).map_err(|e| {
                    SessionStoreError::Unavailable(format!("corrupt session payload: {e}"))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn touch(&self, session_id: &str, ttl_seconds: u64) -> Result<(), SessionStoreError> {
        let mut conn = self.connection.clone();
        // 键不存在时 EXPIRE 返回 false，与内存实现一致地静默忽略
        let _: bool = self
            .with_timeout("touch", conn.expire(Self::key(session_id), ttl_seconds as i64))
            .await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), SessionStoreError> {
        let mut conn = self.connection.clone();
        let _: () = self
            .with_timeout("delete", conn.del(Self::key(session_id)))
            .await?;
        Ok(())
    }
}

/// 带内存降级的组合存储：主存储失败时用内存存储重试同一操作
pub struct FallbackSessionStore {
    primary: Arc<dyn SessionStore>,
    fallback: MemorySessionStore,
}

impl FallbackSessionStore {
    pub fn new(primary: Arc<dyn SessionStore>) -> Self {
        Self {
            primary,
            fallback: MemorySessionStore::new(),
        }
    }

    fn degraded(operation: &str, err: &SessionStoreError) {
        tracing::warn!(operation, error = %err, "主会话存储不可用，降级到内存存储");
    }
}

#[async_trait]
impl SessionStore for FallbackSessionStore {
    async fn save(
        &self,
        session_id: &str,
        data: &serde_json::Value,
        ttl_seconds: u64,
    ) -> Result<(), SessionStoreError> {
        match self.primary.save(session_id, data, ttl_seconds).await {
            Ok(()) => Ok(()),
            Err(err) => {
                Self::degraded("save", &err);
                self.fallback.save(session_id, data, ttl_seconds).await
            }
        }
    }

    async fn load(&self, session_id: &str) -> Result<Option<serde_json::Value>, SessionStoreError> {
        match self.primary.load(session_id).await {
            Ok(found) => Ok(found),
            Err(err) => {
                Self::degraded("load", &err);
                self.fallback.load(session_id).await
            }
        }
    }

    async fn touch(&self, session_id: &str, ttl_seconds: u64) -> Result<(), SessionStoreError> {
        match self.primary.touch(session_id, ttl_seconds).await {
            Ok(()) => Ok(()),
            Err(err) => {
                Self::degraded("touch", &err);
                self.fallback.touch(session_id, ttl_seconds).await
            }
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), SessionStoreError> {
        match self.primary.delete(session_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                Self::degraded("delete", &err);
                self.fallback.delete(session_id).await
            }
        }
    }
}
