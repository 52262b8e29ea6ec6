//! WebSocket 处理器
//!
//! 握手阶段完成认证，无效令牌在升级前即返回 401。
//! 升级后每个连接两条任务：一条把注册表推来的事件写回 socket，
//! 一条读取客户端消息并分发到注册表。任一方向结束都会触发断开清理。

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use domain::{ClientEvent, ConnectionInfo, ServerEvent, UserId};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

struct WsIdentity {
    user_id: UserId,
    username: String,
}

/// 处理 `GET /ws` 升级请求
pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let identity = resolve_identity(&state, query.token.as_deref())?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity, state)))
}

fn resolve_identity(state: &AppState, token: Option<&str>) -> Result<WsIdentity, ApiError> {
    match token {
        Some(token) => {
            let claims = state.token_service.verify(token).map_err(|err| {
                tracing::warn!(error = %err, "WebSocket 握手令牌校验失败");
                ApiError::from(err)
            })?;
            Ok(WsIdentity {
                user_id: UserId::new(claims.sub),
                username: claims.username,
            })
        }
        None if state.config.auth.allow_anonymous => {
            let user_id = UserId::random();
            let username = format!("guest-{}", &user_id.to_string()[..8]);
            tracing::debug!(username = %username, "匿名连接接入");
            Ok(WsIdentity { user_id, username })
        }
        None => Err(ApiError::unauthorized("Missing token")),
    }
}

async fn handle_socket(socket: WebSocket, identity: WsIdentity, state: AppState) {
    let info = ConnectionInfo::new(identity.user_id, identity.username);
    let connection_id = info.connection_id;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.hub.register(info, event_tx.clone()).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    // 注册表 → socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::error!(error = %err, "事件序列化失败");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // socket → 注册表
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&state, connection_id, text.as_str(), &event_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %connection_id, error = %err, "WebSocket 读取错误");
                        break;
                    }
                }
            }
        }
    }

    send_task.abort();
    state.hub.disconnect(connection_id).await;
}

async fn dispatch(
    state: &AppState,
    connection_id: domain::ConnectionId,
    text: &str,
    event_tx: &mpsc::UnboundedSender<ServerEvent>,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            let _ = event_tx.send(ServerEvent::Error {
                code: "bad-message".to_string(),
                message: format!("unrecognized message: {err}"),
            });
            return;
        }
    };

    let result = match event {
        ClientEvent::JoinRoom { room_id } => state.hub.join_room(connection_id, room_id).await,
        ClientEvent::LeaveRoom { room_id } => state.hub.leave_room(connection_id, room_id).await,
        ClientEvent::SendMessage {
            room_id,
            content,
            reply_to,
        } => state
            .hub
            .send_message(connection_id, room_id, content, reply_to)
            .await
            .map(|_| ()),
        ClientEvent::Typing { room_id, is_typing } => {
            state.hub.typing(connection_id, room_id, is_typing).await
        }
    };

    if let Err(err) = result {
        let code = match err {
            application::HubError::NotConnected => "not-connected",
            application::HubError::NotInRoom(_) => "not-in-room",
        };
        let _ = event_tx.send(ServerEvent::Error {
            code: code.to_string(),
            message: err.to_string(),
        });
    }
}
