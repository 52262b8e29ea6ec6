//! 应用层
//!
//! 实时子系统的核心服务：限流、令牌签发与校验、敏感字段加密、
//! 会话存储抽象、在线状态与房间注册表、面向 REST 侧的事件桥。
//! 本层不依赖任何具体传输与存储实现，Redis 等后端在 infrastructure 提供。

pub mod bridge;
pub mod crypto;
pub mod error;
pub mod hub;
pub mod rate_limiter;
pub mod session_store;
pub mod token;

pub use bridge::EventBridge;
pub use crypto::{CryptoError, SecretCipher};
pub use error::ApplicationError;
pub use hub::{ChatHub, HubError};
pub use rate_limiter::{RateLimitError, SlidingWindowRateLimiter};
pub use session_store::{MemorySessionStore, SessionStore, SessionStoreError};
pub use token::{parse_ttl, TokenService, TokenSubject};
