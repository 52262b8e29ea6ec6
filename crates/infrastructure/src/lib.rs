//! 基础设施层
//!
//! 应用层抽象的具体后端实现。目前提供 Redis 会话存储，
//! 以及在 Redis 不可用时降级到内存的组合存储。

pub mod session_store;

pub use session_store::{FallbackSessionStore, RedisSessionStore};
