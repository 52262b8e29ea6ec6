//! HTTP 路由

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::TokenSubject;
use domain::{RoomId, UserId, UserRole};

use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::websocket;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route(
            "/api/auth/sessions/{session_id}",
            get(get_session).delete(logout),
        )
        .route("/api/rooms/{room_id}/read-receipts", post(read_receipt))
        .route("/api/direct-messages/{user_id}", post(direct_message))
        .route("/ws", get(websocket::handle_upgrade))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "onlineUsers": state.hub.online_count().await,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    username: String,
    email: Option<String>,
    /// 形如 "7d" / "24h" / "30m" 的有效期，缺省用服务端配置
    ttl: Option<String>,
}

/// 开发态登录：凭用户名直接签发令牌并建立会话记录。
/// 没有口令校验，生产部署应由外部身份系统签发同格式令牌。
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.username.trim().is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }

    let mut subject = TokenSubject::new(UserId::random(), payload.username.trim(), UserRole::User);
    subject.email = payload.email;

    let token = state.token_service.issue(&subject, payload.ttl.as_deref());
    let ttl_seconds = application::parse_ttl(
        payload
            .ttl
            .as_deref()
            .unwrap_or(&state.config.auth.token_ttl),
    );

    // 邮箱属于敏感字段，落库前加密
    let email_encrypted = subject
        .email
        .as_deref()
        .map(|email| state.cipher.encrypt(email))
        .transpose()
        .map_err(application::ApplicationError::from)?;

    let session_id = Uuid::new_v4().to_string();
    let record = json!({
        "userId": subject.user_id,
        "username": subject.username,
        "email": email_encrypted,
        "issuedAt": chrono::Utc::now().timestamp(),
    });
    state
        .session_store
        .save(&session_id, &record, ttl_seconds.max(0) as u64)
        .await
        .map_err(application::ApplicationError::from)?;

    tracing::info!(user_id = %subject.user_id, username = %subject.username, "用户登录");

    Ok(Json(json!({
        "token": token,
        "sessionId": session_id,
        "userId": subject.user_id,
        "username": subject.username,
        "expiresIn": ttl_seconds,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
    token: String,
    session_id: Option<String>,
    ttl: Option<String>,
}

/// 刷新令牌：过期令牌只要签名有效即可换发新令牌
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = state
        .token_service
        .refresh(&payload.token, payload.ttl.as_deref())?;

    if let Some(session_id) = payload.session_id {
        let ttl_seconds = application::parse_ttl(
            payload
                .ttl
                .as_deref()
                .unwrap_or(&state.config.auth.token_ttl),
        );
        state
            .session_store
            .touch(&session_id, ttl_seconds.max(0) as u64)
            .await
            .map_err(application::ApplicationError::from)?;
    }

    Ok(Json(json!({ "token": token })))
}

/// 查询会话记录，返回前解密敏感字段
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth::authenticate(&state, &headers)?;

    let mut record = state
        .session_store
        .load(&session_id)
        .await
        .map_err(application::ApplicationError::from)?
        .ok_or_else(|| ApiError::not_found("session not found"))?;

    if let Some(encrypted) = record.get("email").and_then(serde_json::Value::as_str) {
        let email = state
            .cipher
            .decrypt(encrypted)
            .map_err(application::ApplicationError::from)?;
        record["email"] = json!(email);
    }
    Ok(Json(record))
}

/// 登出：删除会话记录。令牌本身无状态，到期前仍可通过校验。
async fn logout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    auth::authenticate(&state, &headers)?;

    state
        .session_store
        .delete(&session_id)
        .await
        .map_err(application::ApplicationError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadReceiptPayload {
    message_id: u64,
}

/// 已读回执：REST 侧落库后通过事件桥通知房间
async fn read_receipt(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ReadReceiptPayload>,
) -> Result<StatusCode, ApiError> {
    let claims = auth::authenticate(&state, &headers)?;
    let room = RoomId::from(room_id);

    state
        .bridge
        .read_receipt(&room, UserId::new(claims.sub), payload.message_id)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// 私信：REST 侧处理后定向推送给接收者的在线连接
async fn direct_message(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let claims = auth::authenticate(&state, &headers)?;

    state
        .bridge
        .private_message(UserId::new(user_id), UserId::new(claims.sub), payload)
        .await;
    Ok(StatusCode::NO_CONTENT)
}
