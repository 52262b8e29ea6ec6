//! Web API 层
//!
//! 提供 Axum 路由：认证与限流中间件、登录与刷新接口、
//! WebSocket 升级入口，以及演示事件桥的 REST 接口。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
