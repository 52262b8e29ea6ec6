//! 实时网关核心领域模型
//!
//! 包含连接、令牌、消息等核心实体，以及 WebSocket 协议的事件类型。

pub mod entities;
pub mod events;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use events::*;
pub use value_objects::*;
