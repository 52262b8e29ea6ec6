//! 应用层统一错误

use domain::TokenError;

use crate::crypto::CryptoError;
use crate::hub::HubError;
use crate::rate_limiter::RateLimitError;
use crate::session_store::SessionStoreError;

/// 应用层错误。各子模块错误在这里汇聚，由 Web 层统一映射成响应。
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    SessionStore(#[from] SessionStoreError),

    #[error(transparent)]
    Hub(#[from] HubError),
}
