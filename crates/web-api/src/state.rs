use std::sync::Arc;

use application::{
    ChatHub, EventBridge, SecretCipher, SessionStore, SlidingWindowRateLimiter, TokenService,
};
use config::AppConfig;

/// 路由共享状态。全部成员是 Arc，Clone 很便宜。
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub token_service: Arc<TokenService>,
    pub rate_limiter: Arc<SlidingWindowRateLimiter>,
    pub session_store: Arc<dyn SessionStore>,
    pub cipher: Arc<SecretCipher>,
    pub bridge: Arc<EventBridge>,
    pub config: Arc<AppConfig>,
}
