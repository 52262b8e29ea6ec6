//! 签名令牌相关实体
//!
//! 定义令牌声明和验证错误。令牌本身无服务端状态，
//! 有效性完全由签名和 exp 字段决定。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::UserId;

/// 令牌声明
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// 主题（用户ID）
    pub sub: Uuid,
    /// 用户名
    pub username: String,
    /// 邮箱
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// 用户角色
    pub role: UserRole,
    /// 签发时间（Unix 秒）
    pub iat: i64,
    /// 过期时间（Unix 秒）
    pub exp: i64,
    /// 签发者
    pub iss: String,
    /// 调用方自定义声明，序列化时平铺在顶层
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    pub fn user_id(&self) -> UserId {
        UserId::from(self.sub)
    }

    /// 判断令牌在给定时刻是否已过期。过期判定为 now >= exp（含等号）。
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// 管理员
    Admin,
    /// 普通用户
    #[default]
    User,
    /// 访客
    Guest,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
            UserRole::Guest => write!(f, "guest"),
        }
    }
}

/// 令牌验证错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// 结构损坏或签名不匹配
    #[error("Invalid token")]
    Invalid,
    /// 签名正确但已过期
    #[error("Token expired")]
    Expired,
}
