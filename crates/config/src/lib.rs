//! 统一配置中心
//!
//! 提供实时网关的全局配置管理，包括：
//! - 服务器监听地址
//! - 令牌签名
//! - 密文加密密钥
//! - Redis 会话存储
//! - 限流参数

use serde::{Deserialize, Serialize};
use std::env;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 令牌签名配置
    pub auth: AuthConfig,
    /// 加密配置
    pub encryption: EncryptionConfig,
    /// Redis 配置（缺省时会话存储退化为纯内存）
    pub redis: RedisConfig,
    /// 限流配置
    pub rate_limit: RateLimitConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 令牌签名配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC-SHA256 签名密钥，至少 32 字节
    pub secret: String,
    /// 默认令牌有效期，支持 "7d" / "24h" / "30m" / "45s" 或纯秒数
    pub token_ttl: String,
    /// 签发者标识，写入每个令牌的 iss 字段
    pub issuer: String,
    /// 是否允许匿名 WebSocket 连接（握手缺少 token 时分配访客身份）
    pub allow_anonymous: bool,
}

/// 加密配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// 显式的 256 位密钥（64 位十六进制字符）
    pub key_hex: Option<String>,
    /// 未配置显式密钥时，通过 PBKDF2 从主密钥派生
    pub master_secret: Option<String>,
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    /// 单次 Redis 调用的超时（毫秒）。建连和每个命令都受此限制，
    /// 超时按主存储不可用处理，由降级层接管
    pub command_timeout_ms: u64,
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 每个时间窗口允许的最大请求数
    pub max_requests: u32,
    /// 时间窗口大小（秒）
    pub window_seconds: u64,
}

impl AppConfig {
    /// 从环境变量加载配置
    /// 对于关键安全配置（AUTH_SECRET），如果环境变量不存在将会 panic，
    /// 确保生产环境中不会使用不安全的默认值
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
            },
            auth: AuthConfig {
                secret: env::var("AUTH_SECRET")
                    .expect("AUTH_SECRET environment variable is required for production safety"),
                token_ttl: env::var("AUTH_TOKEN_TTL").unwrap_or_else(|_| "7d".to_string()),
                issuer: env::var("AUTH_ISSUER").unwrap_or_else(|_| "livechat".to_string()),
                allow_anonymous: env::var("AUTH_ALLOW_ANONYMOUS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(false),
            },
            encryption: EncryptionConfig {
                key_hex: env::var("ENCRYPTION_KEY").ok(),
                master_secret: env::var("MASTER_SECRET").ok(),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").ok(),
                command_timeout_ms: env::var("REDIS_COMMAND_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            },
            rate_limit: RateLimitConfig {
                max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
                window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
        }
    }

    /// 从环境变量加载配置，开发环境版本
    /// 提供不安全的默认值，仅用于测试和开发
    pub fn from_env_with_defaults() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
            },
            auth: AuthConfig {
                secret: env::var("AUTH_SECRET").unwrap_or_else(|_| {
                    "dev-secret-key-not-for-production-use-minimum-32-chars".to_string()
                }),
                token_ttl: env::var("AUTH_TOKEN_TTL").unwrap_or_else(|_| "7d".to_string()),
                issuer: env::var("AUTH_ISSUER").unwrap_or_else(|_| "livechat".to_string()),
                allow_anonymous: env::var("AUTH_ALLOW_ANONYMOUS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
            },
            encryption: EncryptionConfig {
                key_hex: env::var("ENCRYPTION_KEY").ok(),
                master_secret: Some(
                    env::var("MASTER_SECRET")
                        .unwrap_or_else(|_| "dev-master-secret-not-for-production".to_string()),
                ),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").ok(),
                command_timeout_ms: env::var("REDIS_COMMAND_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            },
            rate_limit: RateLimitConfig {
                max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
                window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
        }
    }

    /// 验证配置有效性，特别关注生产环境安全
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证签名密钥长度（至少 256 位 / 32 字节）
        if self.auth.secret.len() < 32 {
            return Err(ConfigError::InvalidAuthSecret(
                "Auth secret must be at least 32 characters long".to_string(),
            ));
        }

        // 检查签名密钥是否为明显的开发密钥
        if self.auth.secret.contains("dev-secret")
            || self.auth.secret.contains("not-for-production")
            || self.auth.secret.contains("please-change")
        {
            return Err(ConfigError::InvalidAuthSecret(
                "Cannot use development auth secret in production".to_string(),
            ));
        }

        // 加密密钥必须二选一：显式密钥或主密钥
        match (&self.encryption.key_hex, &self.encryption.master_secret) {
            (None, None) => {
                return Err(ConfigError::InvalidEncryptionKey(
                    "Either ENCRYPTION_KEY or MASTER_SECRET must be configured".to_string(),
                ));
            }
            (Some(key), _) => {
                if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(ConfigError::InvalidEncryptionKey(
                        "ENCRYPTION_KEY must be 64 hex characters (256 bits)".to_string(),
                    ));
                }
            }
            _ => {}
        }

        // 验证限流参数
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_requests must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "window_seconds must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = &self.redis.url {
            if self.redis.command_timeout_ms == 0 {
                return Err(ConfigError::InvalidRedis(
                    "command_timeout_ms must be greater than 0".to_string(),
                ));
            }
            if url.contains("127.0.0.1") || url.contains("localhost") {
                eprintln!("⚠️ WARNING: Using development Redis configuration in production!");
            }
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid auth secret: {0}")]
    InvalidAuthSecret(String),
    #[error("Invalid encryption key: {0}")]
    InvalidEncryptionKey(String),
    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),
    #[error("Invalid redis configuration: {0}")]
    InvalidRedis(String),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本
    /// 注意：生产环境应该明确调用 from_env() 而不是依赖默认值
    fn default() -> Self {
        Self::from_env_with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production_like() -> AppConfig {
        let mut config = AppConfig::from_env_with_defaults();
        config.auth.secret = "production-grade-secret-key-with-sufficient-length".to_string();
        config.encryption.master_secret = Some("production-master-secret".to_string());
        config
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let config = AppConfig::from_env_with_defaults();
        assert!(!config.auth.secret.is_empty());
        assert!(!config.auth.token_ttl.is_empty());
        assert!(config.server.port > 0);
        assert!(config.rate_limit.max_requests > 0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = production_like();
        assert!(config.validate().is_ok());

        // 过短的签名密钥
        config.auth.secret = "short".to_string();
        assert!(config.validate().is_err());

        // 开发密钥在生产环境被拒绝
        config.auth.secret = "dev-secret-key-not-for-production-use".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("development auth secret"));
    }

    #[test]
    fn test_encryption_key_validation() {
        let mut config = production_like();

        // 两个密钥来源都缺失
        config.encryption.key_hex = None;
        config.encryption.master_secret = None;
        assert!(config.validate().is_err());

        // 长度不对的显式密钥
        config.encryption.key_hex = Some("abcd".to_string());
        assert!(config.validate().is_err());

        // 合法的 64 位十六进制密钥
        config.encryption.key_hex = Some("ab".repeat(32));
        assert!(config.validate().is_ok());

        // 只有主密钥也可以
        config.encryption.key_hex = None;
        config.encryption.master_secret = Some("some-master-secret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_validation() {
        let mut config = production_like();

        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());

        config.rate_limit.max_requests = 10;
        config.rate_limit.window_seconds = 0;
        assert!(config.validate().is_err());

        config.rate_limit.window_seconds = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_timeout_validation() {
        let mut config = production_like();

        // 未配置 Redis 时不检查超时
        config.redis.url = None;
        config.redis.command_timeout_ms = 0;
        assert!(config.validate().is_ok());

        config.redis.url = Some("redis://redis.internal:6379".to_string());
        assert!(config.validate().is_err());

        config.redis.command_timeout_ms = 2000;
        assert!(config.validate().is_ok());
    }
}
