//! 主应用程序入口
//!
//! 组装配置、核心服务、会话存储与路由，启动 Axum 服务。

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use application::{
    ChatHub, EventBridge, MemorySessionStore, SecretCipher, SessionStore,
    SlidingWindowRateLimiter, TokenService,
};
use config::AppConfig;
use infrastructure::{FallbackSessionStore, RedisSessionStore};
use web_api::{router, AppState};

/// 设置了 AUTH_SECRET 视为生产部署：走严格加载并在校验失败时拒绝启动。
/// 否则用开发默认值并告警。
fn load_config() -> anyhow::Result<AppConfig> {
    if std::env::var("AUTH_SECRET").is_ok() {
        let config = AppConfig::from_env();
        config.validate()?;
        Ok(config)
    } else {
        tracing::warn!("AUTH_SECRET 未设置，使用开发默认配置，仅适用于本地环境");
        Ok(AppConfig::from_env_with_defaults())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取环境变量配置
    let config = load_config()?;

    // 核心服务
    let token_service = Arc::new(TokenService::new(&config.auth));
    let cipher = Arc::new(SecretCipher::new(&config.encryption)?);
    let rate_limiter = Arc::new(SlidingWindowRateLimiter::new());
    let _sweeper = rate_limiter.spawn_sweeper();

    // 会话存储：配置了 Redis 就用 Redis 加内存降级，否则纯内存
    let session_store: Arc<dyn SessionStore> = match &config.redis.url {
        Some(url) => match RedisSessionStore::connect(&config.redis).await {
            Ok(store) => {
                tracing::info!(url = %url, "会话存储使用 Redis，失败时降级到内存");
                Arc::new(FallbackSessionStore::new(Arc::new(store)))
            }
            Err(err) => {
                tracing::warn!(error = %err, "Redis 连接失败，会话存储退回内存");
                Arc::new(MemorySessionStore::new())
            }
        },
        None => {
            tracing::info!("未配置 Redis，会话存储使用内存");
            Arc::new(MemorySessionStore::new())
        }
    };

    // 在线状态注册表与事件桥
    let hub = Arc::new(ChatHub::new());
    let bridge = Arc::new(EventBridge::new());
    bridge.initialize(hub.clone());

    let state = AppState {
        hub,
        token_service,
        rate_limiter,
        session_store,
        cipher,
        bridge,
        config: Arc::new(config.clone()),
    };

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("实时服务启动在 http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_config_is_strict_when_auth_secret_present() {
        // 环境变量是进程级状态，全部分支在同一个测试里串行走完
        env::remove_var("AUTH_SECRET");
        let config = load_config().unwrap();
        assert!(config.auth.secret.contains("dev-secret"));

        // 生产模式下不合格的密钥直接拒绝启动
        env::set_var("AUTH_SECRET", "short");
        assert!(load_config().is_err());

        env::set_var(
            "AUTH_SECRET",
            "production-grade-secret-key-with-sufficient-length",
        );
        env::set_var("MASTER_SECRET", "production-master-secret");
        let config = load_config().unwrap();
        assert_eq!(
            config.auth.secret,
            "production-grade-secret-key-with-sufficient-length"
        );

        env::remove_var("AUTH_SECRET");
        env::remove_var("MASTER_SECRET");
    }
}
